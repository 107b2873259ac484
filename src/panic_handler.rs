use log::error;
use std::panic;

/// Pretty backtraces on the console, plus a log line so the panic shows up
/// next to the render history in the log file
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        error!("Panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
