//! Graphviz export of a commit set, for debugging merges.

use super::commit::OtCommit;
use crate::core::error::Result;
use serde::Serialize;
use std::fmt::Write;

/// Render `commits` as a `digraph` with one edge per parent link, labelled
/// by the JSON of the diff.
pub fn commits_to_graphviz<'a, K, O>(
    commits: impl IntoIterator<Item = &'a OtCommit<K, O>>,
) -> Result<String>
where
    K: Serialize + 'a,
    O: Serialize + 'a,
{
    let mut text = String::from("digraph {\n");
    for commit in commits {
        let id = serde_json::to_string(&commit.id)?;
        for (parent, diff) in &commit.parents {
            let parent = serde_json::to_string(parent)?;
            let label = serde_json::to_string(diff)?.replace('"', "\\\"");
            let _ = writeln!(text, "  {} -> {}[label=\"{}\"]", parent, id, label);
        }
    }
    text.push('}');
    Ok(text)
}
