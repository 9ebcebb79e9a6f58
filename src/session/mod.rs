pub mod coordinator;
pub mod launch;
pub mod state;

pub use coordinator::{Environment, SessionCoordinator, SessionVerdict, SystemEnvironment};
pub use launch::{LaunchError, Launcher, ProcessLauncher, SessionHandle};
pub use state::{successor, SessionState, SessionStateMachine, Signal};
