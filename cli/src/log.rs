use colored::Colorize;

const DIVIDER_WIDTH: usize = 60;

pub fn print_title(title: &str) {
    println!();
    println!("{}", title.bold().cyan());
    print_divider();
}

pub fn print_section_header(header: &str) {
    println!();
    println!("{}", header.bold());
    println!("{}", "-".repeat(header.len()).dimmed());
}

pub fn print_message(message: &str) {
    println!("  {}", message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "info:".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "warning:".yellow().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_divider() {
    println!("{}", "=".repeat(DIVIDER_WIDTH).dimmed());
}

/// Prints `label: value` with the label padded so a block of them lines up.
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<22} {}", format!("{}:", label).dimmed(), value);
}
