/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → requesting_permission → recording → stopped
///  ↑              │                  │           │
///  └── denied ────┘   device error ──┘    reset ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    RequestingPermission,
    Recording { elapsed_secs: f64 },
    Stopped { duration_secs: f64 },
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Elapsed or final duration, if the state tracks one.
    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { elapsed_secs } => Some(*elapsed_secs),
            Self::Stopped { duration_secs } => Some(*duration_secs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingPermission => "requesting_permission",
            Self::Recording { .. } => "recording",
            Self::Stopped { .. } => "stopped",
        }
    }
}
