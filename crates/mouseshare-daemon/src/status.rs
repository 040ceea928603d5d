//! Observable daemon status.

use mouseshare_types::PeerId;

/// What the daemon is currently doing, in user-visible terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatusKind {
    #[default]
    Running,
    Connecting {
        name: String,
    },
    Controlling {
        name: String,
    },
    ControlledBy {
        name: String,
    },
    LostConnection {
        name: String,
    },
    EscapedToLocal,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Connecting { name } => write!(f, "Connecting to {name}"),
            Self::Controlling { name } => write!(f, "Controlling {name}"),
            Self::ControlledBy { name } => write!(f, "Controlled by {name}"),
            Self::LostConnection { name } => write!(f, "Lost connection to {name}"),
            Self::EscapedToLocal => write!(f, "Escaped to local control"),
        }
    }
}

/// Snapshot broadcast through a watch channel after every transition.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub kind: StatusKind,
    /// Peer this host is forwarding input to, if any.
    pub controlling: Option<PeerId>,
    /// Peer currently controlling this host, if any.
    pub controlled_by: Option<PeerId>,
    pub session_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(StatusKind::Running.to_string(), "Running");
        assert_eq!(
            StatusKind::Controlling {
                name: "laptop".to_string()
            }
            .to_string(),
            "Controlling laptop"
        );
        assert_eq!(
            StatusKind::LostConnection {
                name: "laptop".to_string()
            }
            .to_string(),
            "Lost connection to laptop"
        );
        assert_eq!(
            StatusKind::EscapedToLocal.to_string(),
            "Escaped to local control"
        );
    }
}
