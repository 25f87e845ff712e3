//! Workspace-to-file associations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Blob name under which associations are stored.
pub const WORKSPACE_BLOB: &str = "workspaces";

/// Workspace id → ordered, de-duplicated file ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAssociations {
    #[serde(default)]
    pub workspaces: BTreeMap<String, Vec<String>>,
}

impl WorkspaceAssociations {
    pub fn files(&self, workspace_id: &str) -> Option<&[String]> {
        self.workspaces.get(workspace_id).map(Vec::as_slice)
    }

    /// Associates files with a workspace, creating it if needed. Returns the
    /// number of newly added files.
    pub fn associate(&mut self, workspace_id: &str, file_ids: &[String]) -> usize {
        let files = self.workspaces.entry(workspace_id.to_string()).or_default();
        let mut added = 0;
        for file_id in file_ids {
            if !files.contains(file_id) {
                files.push(file_id.clone());
                added += 1;
            }
        }
        added
    }

    /// Drops a workspace. Returns false if it did not exist.
    pub fn remove_workspace(&mut self, workspace_id: &str) -> bool {
        self.workspaces.remove(workspace_id).is_some()
    }

    /// Removes a file from every workspace; returns the workspaces touched.
    pub fn remove_file(&mut self, file_id: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for (workspace_id, files) in self.workspaces.iter_mut() {
            let before = files.len();
            files.retain(|f| f != file_id);
            if files.len() != before {
                touched.push(workspace_id.clone());
            }
        }
        touched
    }
}
