#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Validating,
    Registering,
    Polling,
    Launching,
    Monitoring,
    Fallback,
    ShuttingDown,
    Terminated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Init => "INIT",
            SessionState::Validating => "VALIDATING",
            SessionState::Registering => "REGISTERING",
            SessionState::Polling => "POLLING",
            SessionState::Launching => "LAUNCHING",
            SessionState::Monitoring => "MONITORING",
            SessionState::Fallback => "FALLBACK",
            SessionState::ShuttingDown => "SHUTTING_DOWN",
            SessionState::Terminated => "TERMINATED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Success,
    Failure,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Success => "success",
            Signal::Failure => "failure",
        }
    }
}

/// Total transition function: every state defines a successor for both
/// signals it can receive.
pub fn successor(state: SessionState, signal: Signal) -> SessionState {
    match (state, signal) {
        (SessionState::Init, _) => SessionState::Validating,
        (SessionState::Validating, Signal::Success) => SessionState::Registering,
        (SessionState::Validating, Signal::Failure) => SessionState::Fallback,
        // Registration failure degrades silently.
        (SessionState::Registering, _) => SessionState::Polling,
        (SessionState::Polling, Signal::Success) => SessionState::Launching,
        (SessionState::Polling, Signal::Failure) => SessionState::Fallback,
        (SessionState::Launching, Signal::Success) => SessionState::Monitoring,
        (SessionState::Launching, Signal::Failure) => SessionState::Fallback,
        (SessionState::Fallback, Signal::Success) => SessionState::Launching,
        (SessionState::Fallback, Signal::Failure) => SessionState::Terminated,
        (SessionState::Monitoring, _) => SessionState::ShuttingDown,
        (SessionState::ShuttingDown, _) => SessionState::Terminated,
        (SessionState::Terminated, _) => SessionState::Terminated,
    }
}

/// Owns the single session state. Mutated only through [`advance`], by one
/// logical thread of control; Fallback is entered at most once, after which
/// another request for it escalates straight to Terminated.
pub struct SessionStateMachine {
    state: SessionState,
    fallback_attempted: bool,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Init,
            fallback_attempted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fallback_attempted(&self) -> bool {
        self.fallback_attempted
    }

    pub fn advance(&mut self, signal: Signal, reason: &str) -> SessionState {
        let from = self.state;
        let mut next = successor(from, signal);

        if next == SessionState::Fallback {
            if self.fallback_attempted {
                next = SessionState::Terminated;
            } else {
                self.fallback_attempted = true;
            }
        }

        self.state = next;
        if from != next {
            tracing::info!(
                state_from = from.as_str(),
                state_to = next.as_str(),
                signal = signal.as_str(),
                reason = reason,
                "session state transition"
            );
        }
        next
    }
}
