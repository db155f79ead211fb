// Terminal output helpers for hunt commands
// Progress and diagnostics go to stderr, step results to stdout.

use std::sync::OnceLock;

const BOLD: &str = "1";
const DIM: &str = "2";
const RED: &str = "1;31";
const GREEN: &str = "32";
const BOLD_GREEN: &str = "1;32";
const YELLOW: &str = "33";
const CYAN: &str = "36";
const BOLD_CYAN: &str = "1;36";

/// Colors are off when `NO_COLOR` is set
fn colored() -> bool {
    static COLORED: OnceLock<bool> = OnceLock::new();
    *COLORED.get_or_init(|| std::env::var_os("NO_COLOR").is_none())
}

fn paint(code: &str, text: &str) -> String {
    if colored() {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Right-aligned action label: "     Running domain_recon (...)"
pub fn status(action: &str, message: &str) {
    eprintln!("{} {}", paint(BOLD_CYAN, &format!("{:>12}", action)), message);
}

pub fn success(message: &str) {
    eprintln!("{} {}", paint(BOLD_GREEN, "  \u{2713}"), message);
}

pub fn failure(message: &str) {
    eprintln!("{} {}", paint(RED, "  \u{2717}"), message);
}

/// A passed validation check
pub fn check(message: &str) {
    eprintln!("{} {}", paint(GREEN, "  \u{2713}"), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", paint(YELLOW, "  !"), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", paint(RED, "error:"), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", paint(CYAN, "  i"), message);
}

pub fn dim(message: &str) {
    eprintln!("{}", paint(DIM, message));
}

/// Progress line: "[ 40%] running DNS lookup"
pub fn progress(percent: u8, message: &str) {
    eprintln!("{} {}", paint(DIM, &format!("[{:>3}%]", percent)), message);
}

/// One line of a step's collected output
pub fn step_output(line: &str) {
    println!("        | {}", line);
}

pub fn header(message: &str) {
    eprintln!("{}", paint(BOLD, &format!("==> {}", message)));
}
