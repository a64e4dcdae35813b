//! Where a resolution gets its URL from, and whether it downloads.

/// What the resolution knows when it picks a plan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Demand {
    pub has_local: bool,
    pub outdated: bool,
    pub online: bool,
    pub eager: bool,
    /// Known size at or below the download threshold.
    pub cheap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Serve the local copy as is.
    Local,
    /// Serve the local copy and refresh it in the background.
    LocalThenRefresh,
    /// Download now and serve the new local copy.
    Download,
    /// Serve the remote URL; nothing is fetched.
    Remote,
    /// Serve the remote URL and download in the background.
    RemoteThenDownload,
}

pub(crate) fn plan(d: Demand) -> Plan {
    if d.has_local {
        if !d.outdated || !d.online {
            return Plan::Local;
        }
        return if d.eager {
            Plan::Download
        } else {
            Plan::LocalThenRefresh
        };
    }
    if !d.online {
        Plan::Remote
    } else if d.eager || d.cheap {
        Plan::Download
    } else {
        Plan::RemoteThenDownload
    }
}
