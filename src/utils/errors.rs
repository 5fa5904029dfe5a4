//! User-Friendly Error Formatting
//!
//! Turns the binary's top-level error into a message with troubleshooting
//! hints for the common failure scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Outermost context decides the category, the chain goes in the details
    let error_msg = error.to_string();

    if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else if error_msg.contains("trace") {
        format_trace_error(&mut output, &error_msg);
    } else if error_msg.contains("gesture service") {
        format_service_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-edge-gesture -vvv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Print the effective configuration: lamco-edge-gesture --show-config"
    )
    .ok();

    output
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Configuration file not found").ok();
    writeln!(
        output,
        "     → Specify: lamco-edge-gesture -c /path/to/config.toml"
    )
    .ok();
    writeln!(output, "     → Or run without -c to use the defaults").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Value out of range").ok();
    writeln!(output, "     → Sensitivity must be 0-4").ok();
    writeln!(
        output,
        "     → Edge thickness, trigger distance, tolerance and timeout must be positive"
    )
    .ok();
    writeln!(output, "     → Display width and height must be non-zero").ok();
}

fn format_trace_error(output: &mut String, _error: &str) {
    writeln!(output, "Trace Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not read the event trace.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Trace file not found").ok();
    writeln!(output, "     → Pass a JSON-lines file, or '-' for stdin").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Malformed record").ok();
    writeln!(output, "     → One JSON object per line").ok();
    writeln!(
        output,
        "     → Each record needs a \"type\": motion, key, display or ime"
    )
    .ok();
    writeln!(
        output,
        "     → Motion records need action, pointers, time_ms and down_time_ms"
    )
    .ok();
}

fn format_service_error(output: &mut String, _error: &str) {
    writeln!(output, "Gesture Service Error").ok();
    writeln!(output).ok();
    writeln!(output, "The gesture service could not be started or stopped.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Thread limit reached").ok();
    writeln!(output, "     → Check: ulimit -u").ok();
    writeln!(output).ok();
    writeln!(output, "  2. A listener panicked during an activation").ok();
    writeln!(output, "     → Re-run with -vv to see the last activation").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Replay Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while replaying the trace.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
}
