use pipeboard::cli::{internal_error, is_internal, run, user_error};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("PIPEBOARD_LOG", "warn"))
        .format_timestamp(None)
        .init();

    #[cfg(windows)]
    let _ = enable_ansi_support::enable_ansi_support();

    if let Err(e) = run() {
        if is_internal(&e) {
            // Alternate form prints the whole cause chain on one line
            internal_error(&format!("{:#}", e));
        } else {
            user_error(&e.to_string());
        }
    }
}
