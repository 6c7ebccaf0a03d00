#[cfg(test)]
mod tests {
    use crate::env::load_environment;
    use serial_test::serial;

    // Env-file loading touches process-wide state, so these stay serial.

    #[test]
    #[serial]
    fn test_load_environment_without_files() {
        temp_env::with_var("ROCKET_PROFILE", None::<&str>, || {
            // Missing env files are skipped with a warning, never an error
            assert!(load_environment().is_ok());
        });
    }

    #[test]
    #[serial]
    fn test_load_environment_production_profile() {
        temp_env::with_var("ROCKET_PROFILE", Some("production"), || {
            assert!(load_environment().is_ok());
        });
    }
}
