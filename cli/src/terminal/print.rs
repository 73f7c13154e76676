use colored::*;
use lanlink_common::config::Config;
use lanlink_common::peer::Peer;

pub const TOTAL_WIDTH: usize = 64;

pub fn banner(name: &str, cfg: &Config) {
    let text = format!("⟦ LANLINK v{} ⟧", env!("CARGO_PKG_VERSION"));
    let pad = TOTAL_WIDTH.saturating_sub(text.chars().count()) / 2;
    let sep: ColoredString = "═".repeat(pad).bright_black();
    println!("{}{}{}", sep, text.bright_green().bold(), sep);

    println!(
        "node {} on port {}, announcing to {}",
        name.green().bold(),
        cfg.port.to_string().yellow(),
        cfg.broadcast.to_string().yellow(),
    );
    println!("type {} for the command list", "help".bold());
}

pub fn header(msg: &str) {
    let formatted = format!("⟦ {} ⟧", msg);
    let msg_len = formatted.chars().count();

    let dash_count = TOTAL_WIDTH.saturating_sub(msg_len);
    let left = dash_count / 2;
    let right = dash_count - left;

    println!(
        "{}{}{}",
        "─".repeat(left).bright_black(),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right).bright_black(),
    );
}

pub fn usage() {
    let entries: [(&str, &str); 5] = [
        ("peers", "list discovered peers"),
        ("talk <peer> <message>", "send an acknowledged message"),
        ("send <peer> <path>", "transfer a file"),
        ("help", "show this list"),
        ("quit", "shut the node down"),
    ];
    for (command, description) in entries {
        println!("  {} {}", pad(command, 24).bold(), description.dimmed());
    }
}

pub fn peer_table(peers: &[Peer]) {
    header("active peers");

    if peers.is_empty() {
        println!("{}", "No peers discovered yet.".dimmed());
        return;
    }

    println!(
        "{} {} {}",
        pad("NAME", 20).bold(),
        pad("ADDRESS", 24).bold(),
        pad("SEEN (s)", 8).bold(),
    );
    for peer in peers {
        println!(
            "{} {} {}",
            pad(&peer.name, 20).green(),
            pad(&peer.addr.to_string(), 24),
            peer.seen_secs_ago(),
        );
    }
}

pub fn message(from: &str, body: &str) {
    println!();
    header("new message");
    println!("{} {}", "From:".bold(), from.green().bold());
    println!("{} {}", "Message:".bold(), body);
    println!("{}", "─".repeat(TOTAL_WIDTH).bright_black());
}

/// Pads before coloring; ANSI escapes would otherwise count against the
/// field width.
fn pad(text: &str, width: usize) -> ColoredString {
    format!("{text:<width$}").normal()
}
