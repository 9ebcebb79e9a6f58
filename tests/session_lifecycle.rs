#[path = "support/mod.rs"]
mod support;

use sessiond::config::profile::{RegistrationConfig, Tier};
use sessiond::session::launch::Launcher;
use sessiond::session::{SessionCoordinator, SessionVerdict};
use std::sync::Arc;
use support::mocks::{
    endpoint, test_profile, MapEnvironment, ProbeScript, ScriptedLauncher, ScriptedProbe,
};

#[tokio::test(start_paused = true)]
async fn ready_critical_tier_launches_the_primary_target() {
    let probe = Arc::new(ScriptedProbe::new().script("compositor", ProbeScript::Ready));
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(verdict.exit_code(), 0);
    assert_eq!(launcher.commands(), vec!["primary-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn empty_critical_tier_is_vacuously_ready() {
    let probe = Arc::new(ScriptedProbe::new());
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let profile = test_profile(Vec::new(), 0.75);

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(launcher.commands(), vec!["primary-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn missed_threshold_engages_the_fallback() {
    let probe = Arc::new(ScriptedProbe::new().script("compositor", ProbeScript::NotReady));
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    // Degraded but the session ran and shut down cleanly.
    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(verdict.exit_code(), 0);
    assert_eq!(launcher.commands(), vec!["fallback-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn primary_launch_failure_retries_on_the_fallback_path() {
    let probe = Arc::new(ScriptedProbe::new().script("compositor", ProbeScript::Ready));
    let launcher = Arc::new(ScriptedLauncher::new(vec![false, true]));
    let profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(
        launcher.commands(),
        vec!["primary-wm".to_string(), "fallback-wm".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_fallback_terminates_without_a_second_retry() {
    let probe = Arc::new(ScriptedProbe::new().script("compositor", ProbeScript::NotReady));
    let launcher = Arc::new(ScriptedLauncher::new(vec![false]));
    let profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::DegradedFailed);
    assert_eq!(verdict.exit_code(), 1);
    // Fallback is engaged at most once; no third launch attempt exists.
    assert_eq!(launcher.commands(), vec!["fallback-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn missing_environment_without_a_session_exits_two() {
    let probe = Arc::new(ScriptedProbe::new());
    let launcher = Arc::new(ScriptedLauncher::new(vec![false]));
    let mut profile = test_profile(Vec::new(), 0.75);
    profile.required_env = vec!["WAYLAND_DISPLAY".to_string()];

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .with_environment(Arc::new(MapEnvironment::new(&[])))
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::EnvironmentMissing);
    assert_eq!(verdict.exit_code(), 2);
    assert_eq!(launcher.commands(), vec!["fallback-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn missing_environment_with_a_working_fallback_still_runs() {
    let probe = Arc::new(ScriptedProbe::new());
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let mut profile = test_profile(Vec::new(), 0.75);
    profile.required_env = vec!["WAYLAND_DISPLAY".to_string()];

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .with_environment(Arc::new(MapEnvironment::new(&[])))
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(launcher.commands(), vec!["fallback-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn present_environment_passes_validation() {
    let probe = Arc::new(ScriptedProbe::new().script("compositor", ProbeScript::Ready));
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let mut profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);
    profile.required_env = vec!["XDG_RUNTIME_DIR".to_string()];

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .with_environment(Arc::new(MapEnvironment::new(&[(
            "XDG_RUNTIME_DIR",
            "/run/user/1000",
        )])))
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(launcher.commands(), vec!["primary-wm".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn registration_failure_does_not_gate_the_launch() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .script("session-manager", ProbeScript::Unavailable)
            .script("compositor", ProbeScript::Ready),
    );
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let mut profile = test_profile(vec![endpoint("compositor", Tier::Critical)], 1.0);
    profile.registration = Some(RegistrationConfig {
        endpoint: "session-manager".to_string(),
    });

    let verdict = SessionCoordinator::new(profile, probe, Arc::clone(&launcher) as Arc<dyn Launcher>)
        .run()
        .await;

    assert_eq!(verdict, SessionVerdict::Clean);
    assert_eq!(launcher.commands(), vec!["primary-wm".to_string()]);
}
