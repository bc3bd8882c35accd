use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lan_sweep::config::ScanConfig;
use lan_sweep::ports::{self, PortSelection};
use lan_sweep::scanner::{sort_hosts_by_ip, Scanner};
use lan_sweep::server::{self, AppState, ScanTarget};
use lan_sweep::state::ScanState;
use lan_sweep::types::HostInfo;
use lan_sweep::vendor::{VendorConfig, VendorResolver};
use lan_sweep::{export, logging, netdetect, search};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// lan-sweep: discover live hosts on a subnet, fingerprint their TCP services and name their hardware vendors.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-sweep",
    version,
    about = "Discover live hosts on a subnet, fingerprint their TCP services and name their hardware vendors.",
    long_about = None
)]
struct Cli {
    /// Target CIDR or single address. Overrides --subnet.
    target: Option<String>,

    /// CIDR to scan (e.g., 192.168.1.0/24). If omitted, the local subnet is auto-detected.
    #[arg(long)]
    subnet: Option<String>,

    /// First port of the range to scan.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    start: Option<u16>,

    /// Last port of the range to scan.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    end: Option<u16>,

    /// Comma-separated list of ports (e.g., 22,80,443). Takes precedence over --start/--end.
    #[arg(short = 'p', long = "ports")]
    ports: Option<String>,

    /// Discover active IPs only, without port scanning.
    #[arg(long = "ips", default_value_t = false)]
    ips_only: bool,

    /// Timeout per port and per ping, in milliseconds.
    #[arg(long = "timeout", default_value_t = 200)]
    timeout_ms: u64,

    /// Search IP and vendor fields only.
    #[arg(long, default_value_t = false)]
    focused: bool,

    /// Initial search term applied to the results.
    #[arg(short = 's', long = "search")]
    search: Option<String>,

    /// Run without the dashboard and write results to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Address the dashboard listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory holding the vendor caches and the OUI registry copy.
    #[arg(long = "cache-dir", default_value = ".")]
    cache_dir: PathBuf,

    /// Never contact the IEEE registry or the vendor lookup API.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let selection = port_selection(&cli)?;
    let subnet = target_subnet(&cli)?;
    let timeout = Duration::from_millis(cli.timeout_ms);

    let vendor_config = if cli.offline {
        VendorConfig::offline(&cli.cache_dir)
    } else {
        VendorConfig {
            cache_dir: cli.cache_dir.clone(),
            ..VendorConfig::default()
        }
    };
    let vendor = Arc::new(VendorResolver::new(vendor_config));
    let scanner = Arc::new(Scanner::with_ping(vendor, Arc::new(ScanState::new())));

    match cli.csv.as_deref() {
        Some(path) => {
            let config = ScanConfig::batch(selection, timeout, cli.ips_only);
            run_batch(&scanner, &subnet, config, path).await
        }
        None => {
            let config = ScanConfig::continuous(selection, timeout, cli.ips_only);
            run_interactive(&scanner, &cli, subnet, config).await
        }
    }
}

fn port_selection(cli: &Cli) -> Result<PortSelection> {
    if let Some(list) = cli.ports.as_deref() {
        let ports = ports::parse_port_list(list).context("Error parsing port list")?;
        if !ports.is_empty() {
            return Ok(PortSelection::List(ports));
        }
    }
    if cli.start.is_some() || cli.end.is_some() {
        let start = cli.start.unwrap_or(1);
        let end = cli.end.unwrap_or(1024);
        if start > end {
            anyhow::bail!("Error parsing port range: start {start} is greater than end {end}");
        }
        return Ok(PortSelection::Range { start, end });
    }
    Ok(PortSelection::default())
}

fn target_subnet(cli: &Cli) -> Result<String> {
    let explicit = cli.target.as_deref().or(cli.subnet.as_deref());
    let net = match explicit {
        Some(s) => netdetect::parse_subnet(s).context("Error parsing subnet")?,
        None => netdetect::detect_local_subnet().context(
            "Error detecting local subnet; specify one with --subnet or as an argument",
        )?,
    };
    Ok(net.to_string())
}

fn describe_ports(config: &ScanConfig) -> String {
    if config.discovery_only {
        return "IP discovery only".to_string();
    }
    match &config.ports {
        PortSelection::List(p) => format!("{:?}", p),
        PortSelection::Range { start, end } => format!("{start}-{end}"),
    }
}

async fn run_batch(
    scanner: &Arc<Scanner>,
    subnet: &str,
    config: ScanConfig,
    path: &std::path::Path,
) -> Result<()> {
    let net = netdetect::parse_subnet(subnet).context("Error parsing subnet")?;
    let hosts = netdetect::expand_subnet(net).len();

    println!("lan-sweep non-interactive scan:");
    println!("  target       : {}", subnet);
    println!("  ports        : {}", describe_ports(&config));
    println!("  timeout_ms   : {}", config.timeout.as_millis());
    println!("  output       : {}", path.display());
    println!("\nScanning {} hosts...", hosts);

    // Ctrl-C stops the scan; whatever finished is still exported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let started = Instant::now();
    let mut results = scanner.scan_subnet(net, &config, &cancel).await;
    let elapsed = started.elapsed();

    let active = results.iter().filter(|h| h.is_reachable).count();
    let open: usize = results.iter().map(|h| h.services.len()).sum();
    println!("Scan completed in {:.3}s", elapsed.as_secs_f64());
    println!("Results: {} active hosts, {} open ports", active, open);

    sort_hosts_by_ip(&mut results);
    export::export_csv(path, &results).context("Error exporting to CSV")?;
    println!("Results exported to {}", path.display());
    scanner.vendor().flush().await;
    Ok(())
}

async fn run_interactive(
    scanner: &Arc<Scanner>,
    cli: &Cli,
    subnet: String,
    config: ScanConfig,
) -> Result<()> {
    println!("lan-sweep configuration:");
    println!("  target       : {}", subnet);
    println!("  ports        : {}", describe_ports(&config));
    println!("  timeout_ms   : {}", config.timeout.as_millis());
    println!("  dashboard    : http://{}", cli.bind);

    scanner.start_scan(&subnet, config.clone()).await?;

    let app = AppState::new(
        scanner.clone(),
        ScanTarget {
            subnet: subnet.clone(),
            config,
        },
        cli.focused,
    );
    let bind = cli.bind.clone();
    tokio::spawn(async move {
        if let Err(e) = server::spawn_server(&bind, app).await {
            eprintln!("Dashboard server error: {e}");
        }
    });

    let state = scanner.state().clone();
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        ticker.tick().await;
        let p = state.progress().await;
        print!(
            "\r  {}/{} hosts | {} active | {} open ports | {:<15}",
            p.hosts_scanned, p.total_hosts, p.active_hosts, p.open_ports, p.current_host
        );
        let _ = std::io::stdout().flush();
        if state.is_complete().await {
            println!();
            break;
        }
    }

    let results = state.results().await;
    let term = cli.search.as_deref().unwrap_or("");
    let shown = search::filter_hosts(&results, term, cli.focused);
    println!("Vendors: {}", search::unique_vendors(&results));
    print_hosts_table(&shown);

    println!("\nDashboard still serving at http://{} (Ctrl+C to stop)...", cli.bind);
    let _ = tokio::signal::ctrl_c().await;
    scanner.vendor().flush().await;
    Ok(())
}

fn print_hosts_table(hosts: &[HostInfo]) {
    let mut ip_w = "ip".len();
    let mut vendor_w = "vendor".len();
    let mut name_w = "hostname".len();
    for h in hosts {
        ip_w = ip_w.max(h.ip.len());
        vendor_w = vendor_w.max(h.vendor.len().min(30));
        name_w = name_w.max(h.hostname.len().min(30));
    }
    let mac_w = 17usize;

    println!("\nHosts: {}", hosts.len());
    println!(
        "{:<ip_w$}  {:<mac_w$}  {:<vendor_w$}  {:<name_w$}  {}",
        "ip",
        "mac",
        "vendor",
        "hostname",
        "services",
        ip_w = ip_w,
        mac_w = mac_w,
        vendor_w = vendor_w,
        name_w = name_w
    );
    println!(
        "{:-<ip_w$}  {:-<mac_w$}  {:-<vendor_w$}  {:-<name_w$}  {:-<8}",
        "",
        "",
        "",
        "",
        "",
        ip_w = ip_w,
        mac_w = mac_w,
        vendor_w = vendor_w,
        name_w = name_w
    );
    for h in hosts {
        let services: Vec<String> = h
            .services
            .iter()
            .map(|s| format!("{}/{}", s.port, s.service))
            .collect();
        let vendor: String = h.vendor.chars().take(30).collect();
        let name: String = h.hostname.chars().take(30).collect();
        println!(
            "{:<ip_w$}  {:<mac_w$}  {:<vendor_w$}  {:<name_w$}  {}",
            h.ip,
            h.mac,
            vendor,
            name,
            services.join(", "),
            ip_w = ip_w,
            mac_w = mac_w,
            vendor_w = vendor_w,
            name_w = name_w
        );
    }
}
