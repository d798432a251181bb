//! Terminal output for startup and login state.

const RULE: &str = "──────────────────────────────────────────────";

pub fn print_intro() {
    println!("{RULE}");
    println!(" gptbridge v{}", env!("CARGO_PKG_VERSION"));
    println!(" Text and voice messages in, AI answers and images out.");
    println!("{RULE}");
}

pub fn print_qr_code(code: &str) {
    println!("{}", login_banner(code));
}

/// The login code is a plain `t.me` link; it is printed, not drawn.
fn login_banner(code: &str) -> String {
    format!("\n Open this link to start chatting:\n\n   {code}\n")
}

pub fn print_loading() {
    println!(" Loading...");
}

pub fn print_outro() {
    println!(" ✓ Ready, waiting for messages.");
}
