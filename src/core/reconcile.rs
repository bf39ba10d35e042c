// ─── Version Reconciler ───
// Pure mapping from (remote descriptor, local record) to the work required.

use serde::Serialize;

use crate::core::config::{LocalGameRecord, RemoteGameDescriptor};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    NeedsInstall,
    NeedsClientUpdate,
    NeedsPatch,
    UpToDate,
}

impl UpdateAction {
    /// Button label a host shows before the user confirms the work.
    pub fn prompt(&self) -> &'static str {
        match self {
            UpdateAction::NeedsInstall => "Install",
            UpdateAction::NeedsClientUpdate => "Download Client",
            UpdateAction::NeedsPatch => "Download Updates",
            UpdateAction::UpToDate => "Play",
        }
    }

    /// Status line matching [`prompt`](Self::prompt).
    pub fn describe(&self) -> &'static str {
        match self {
            UpdateAction::NeedsInstall => "Game is not yet installed",
            UpdateAction::NeedsClientUpdate => "New Client available",
            UpdateAction::NeedsPatch => "Updates available",
            UpdateAction::UpToDate => "Game is ready to play",
        }
    }

    pub fn needs_client(&self) -> bool {
        matches!(
            self,
            UpdateAction::NeedsInstall | UpdateAction::NeedsClientUpdate
        )
    }
}

/// Decide what `local` needs to match `remote`. An absent record counts as
/// not installed. A record ahead of the remote is up to date: versions only
/// ever move forward.
///
/// A client-version mismatch outranks pending patches: updating the client
/// discards the patch baseline.
pub fn reconcile(remote: &RemoteGameDescriptor, local: Option<&LocalGameRecord>) -> UpdateAction {
    let (client_ver, patch_ver) = local.map_or((0, 0), |l| (l.client_ver, l.patch_ver));

    if client_ver == 0 && remote.client_ver > 0 {
        UpdateAction::NeedsInstall
    } else if client_ver > 0 && remote.client_ver > client_ver {
        UpdateAction::NeedsClientUpdate
    } else if remote.client_ver == client_ver && remote.patch_count() > patch_ver {
        UpdateAction::NeedsPatch
    } else {
        UpdateAction::UpToDate
    }
}
