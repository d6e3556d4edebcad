use log::error;
use std::panic;

/// Install a panic hook that records the panic in the log before the
/// default report is printed.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        error!("Thread '{name}' panicked: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        // Worker threads recover from job panics; only the main thread exits
        if name == "main" {
            std::process::exit(1);
        }
    }));
}
