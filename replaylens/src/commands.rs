use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;
use url::Url;

/// Options shared by every subcommand that walks a crawl output root.
fn batch_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(<CRAWL_ROOT>)
            .required(true)
            .help("Directory holding one capture directory per crawled page"),
    )
    .arg(
        arg!(-t --"threads" <NUM_WORKERS>)
            .required(false)
            .help("The number of capture directories analysed concurrently")
            .value_parser(clap::value_parser!(usize)),
    )
    .arg(
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("Save report to file (default: display to screen)")
            .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
        arg!(-f --"format" <FORMAT>)
            .required(false)
            .help("Report format: text, json, csv")
            .value_parser(["text", "json", "csv"])
            .default_value("text"),
    )
    .arg(
        arg!(--"no-replays")
            .required(false)
            .help("Accept capture directories without HAR and WARC replays")
            .action(clap::ArgAction::SetTrue),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("replaylens")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("replaylens")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress bars and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log analysis details to stderr")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            batch_args(
                command!("requests")
                    .about("Reconcile the requests in each graph with the HAR and WARC archives"),
            )
            .arg(
                arg!(--"grace" <SECONDS>)
                    .required(false)
                    .help("Seconds after capture end during which archive records still count")
                    .value_parser(clap::value_parser!(i64))
                    .default_value("10"),
            )
            .arg(
                arg!(--"infra-host" <HOST>)
                    .required(false)
                    .help("Drop requests to this host and its subdomains (repeatable; replaces the defaults)")
                    .action(clap::ArgAction::Append),
            ),
        )
        .subcommand(batch_args(
            command!("js-compare").about(
                "Compare JS API call counts between the console logs, the graph and both \
                replays",
            ),
        ))
        .subcommand(batch_args(
            command!("listeners")
                .about("Compare inline event handler counts between the graph and the console logs"),
        ))
        .subcommand(
            batch_args(
                command!("attribute")
                    .about("Trace who requested every URL containing a substring"),
            )
            .arg(
                arg!(-n --"needle" <TEXT>)
                    .required(true)
                    .help("Substring to look for in request URLs"),
            ),
        )
        .subcommand(
            command!("trace")
                .about("Print the causal chain of one node in a single graph")
                .arg(
                    arg!(<GRAPHML>)
                        .required(true)
                        .help("Path to a .graphml file"),
                )
                .arg(
                    arg!(--"node" <ID>)
                        .required(true)
                        .help("Numeric id of the node to trace")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"origin" <URL>)
                        .required(false)
                        .help("Page origin (default: recovered from the graph file name)")
                        .value_parser(clap::value_parser!(Url)),
                ),
        )
}
