use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use async_sweep::{AddressRange, PingProber, ScanConfigBuilder, ScanResult, Scanner};
use clap::Parser;

/// Find hosts in an IPv4 range that do not answer a ping.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address range to scan, in prefix notation (e.g. 192.168.1.0/24).
    /// Prompted for interactively when omitted.
    range: Option<String>,

    /// Maximum number of probes in flight at once
    #[arg(short, long, default_value_t = 50)]
    concurrency: usize,

    /// Per-probe timeout in seconds
    #[arg(short, long, default_value_t = 1)]
    timeout: u64,

    /// Skip the confirmation prompt for large ranges
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let range = match resolve_range(args.range.as_deref()) {
        Some(range) => range,
        None => return ExitCode::FAILURE,
    };

    let config = ScanConfigBuilder::new()
        .with_concurrency(args.concurrency)
        .with_probe_timeout(Duration::from_secs(args.timeout))
        .build();
    let mut scanner = Scanner::new(PingProber::new(), config);
    if !args.yes {
        scanner = scanner.with_confirm(|host_count| {
            prompt_yes_no(&format!(
                "about to probe {host_count} hosts, this may take a while. Continue? [y/N] "
            ))
        });
    }

    match scanner.scan(&range).await {
        Ok(result) => {
            render(&range, &result);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("sweep failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Parses the range argument, or prompts for one until a valid range is
/// entered. `None` means no usable range could be obtained.
fn resolve_range(arg: Option<&str>) -> Option<AddressRange> {
    if let Some(input) = arg {
        return match input.parse() {
            Ok(range) => Some(range),
            Err(err) => {
                eprintln!("{err}");
                None
            }
        };
    }

    let stdin = io::stdin();
    loop {
        print!("Range to scan (prefix notation, e.g. 192.168.1.0/24): ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).ok()? == 0 {
            return None;
        }
        match line.trim().parse() {
            Ok(range) => return Some(range),
            Err(err) => eprintln!("{err}"),
        }
    }
}

fn prompt_yes_no(question: &str) -> bool {
    print!("{question}");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn render(range: &AddressRange, result: &ScanResult) {
    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "scanned {} hosts in {} in {:.2}s",
        result.total,
        range,
        result.elapsed.as_secs_f64()
    )
    .unwrap();
    writeln!(stdout, "reachable: {}", result.reachable).unwrap();
    if result.unreachable.is_empty() {
        writeln!(stdout, "every host answered").unwrap();
    } else {
        writeln!(stdout, "unreachable ({}):", result.unreachable.len()).unwrap();
        for host in &result.unreachable {
            writeln!(stdout, "  {host}").unwrap();
        }
    }
}
