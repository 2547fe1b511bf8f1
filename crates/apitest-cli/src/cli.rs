use std::path::PathBuf;

use apitest_core::HttpMethod;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "apitest",
    version,
    about = "Test HTTP routes once, under load, or against declared expectations"
)]
pub struct Cli {
    /// Log at debug level unless APITEST_LOG or RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send repeated requests to one route and print a summary
    TestRoute(TestRouteArgs),
    /// Check routes against the expectations declared in a YAML file
    ExpectTest(ExpectTestArgs),
}

#[derive(Debug, Args)]
pub struct TestRouteArgs {
    /// Absolute http(s) URL of the route
    pub url: String,

    /// The number of requests to send to the route
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub number: u64,

    /// The concurrency level
    #[arg(
        short,
        long,
        env = "APITEST_CONCURRENCY",
        default_value_t = default_concurrency(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub concurrency: u64,

    /// Request method
    #[arg(short, long, default_value = "GET")]
    pub method: HttpMethod,

    /// Request header as 'Name: value'; repeatable
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Request body, sent for POST, PUT and PATCH
    #[arg(short = 'd', long)]
    pub body: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "APITEST_TIMEOUT", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExpectTestArgs {
    /// Path of the file containing the input and expected output
    #[arg(short, long, env = "APITEST_SPECS", default_value = "specs.yaml")]
    pub filepath: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, env = "APITEST_TIMEOUT", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn default_concurrency() -> u64 {
    std::thread::available_parallelism().map_or(1, |n| n.get() as u64)
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
