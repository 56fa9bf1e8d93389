use clap;
use colored::Colorize;
use commands::command_argument_builder;
use replaylens::handlers::{
    handle_attribute, handle_js_compare, handle_listeners, handle_requests, handle_trace,
    init_tracing, print_banner,
};

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(chosen_command.get_flag("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        // No subcommand provided, just show the banner
        None => return,
        Some(("requests", primary_command)) => handle_requests(primary_command, quiet).await,
        Some(("js-compare", primary_command)) => handle_js_compare(primary_command, quiet).await,
        Some(("listeners", primary_command)) => handle_listeners(primary_command, quiet).await,
        Some(("attribute", primary_command)) => handle_attribute(primary_command, quiet).await,
        Some(("trace", primary_command)) => handle_trace(primary_command, quiet),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
