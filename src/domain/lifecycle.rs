use std::fmt;

/// Lifecycle of a service as driven by the orchestration runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Initialized,
    Started,
    Stopped,
    Error,
}

impl ServiceState {
    /// States a service may be in before moving to `self`
    pub fn allowed_from(self) -> &'static [ServiceState] {
        match self {
            Self::Created | Self::Error => &[],
            Self::Initialized => &[Self::Created],
            Self::Started => &[Self::Initialized],
            Self::Stopped => &[Self::Created, Self::Initialized, Self::Started, Self::Stopped],
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Initialized => write!(f, "initialized"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Startup phase in which a service failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Start,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Start => write!(f, "start"),
        }
    }
}
