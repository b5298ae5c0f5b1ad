//! Candidates command
//!
//! Walks the connection generator over the configured servers with real DNS
//! and prints every candidate in the order a login would try them.

use colored::Colorize;
use notifier_core::config::toml_config;
use notifier_core::error::NotifierError;
use notifier_core::login::{ConnectionGenerator, ConnectionSettings, Step};
use notifier_core::net::{HostResolver, SystemResolver};

/// Run the candidates command
pub fn run_candidates(json: bool) -> Result<(), NotifierError> {
    let config = toml_config::load_config()?;
    let notifier = config.notifier;

    let mut generator = ConnectionGenerator::new(
        notifier.servers.clone(),
        notifier.options.proxy.resolve(),
        notifier.proxy_only,
    );

    let runtime = super::runtime()?;
    let (candidates, first_dns_error) = runtime.block_on(async {
        let resolver = SystemResolver::new();
        let mut candidates = Vec::new();
        let mut next = generator.start_generating();
        let mut first_dns_error = 0;

        while let Some(step) = next {
            next = match step {
                Step::NewSettings(settings) => {
                    candidates.push(settings);
                    generator.use_next_connection()
                }
                Step::Resolve { server_index, host } => {
                    let result = resolver.resolve(&host).await.map_err(|e| e.code());
                    generator.on_resolved(server_index, result)
                }
                Step::Exhausted {
                    first_dns_error: error,
                    ..
                } => {
                    first_dns_error = error;
                    None
                }
            };
        }

        (candidates, first_dns_error)
    });

    if json {
        print_json(&candidates)
    } else {
        print_table(&candidates, first_dns_error);
        Ok(())
    }
}

fn print_table(candidates: &[ConnectionSettings], first_dns_error: i32) {
    if candidates.is_empty() {
        println!("{}", "No connection candidates".red().bold());
        if first_dns_error != 0 {
            println!("First DNS error: {}", first_dns_error);
        }
        return;
    }

    for (index, settings) in candidates.iter().enumerate() {
        let route = if settings.use_proxy {
            "proxy".yellow()
        } else {
            "direct".green()
        };
        let port_note = if settings.use_fake_tls_port { " (443 fallback)" } else { "" };
        println!(
            "{:>3}. {:<40} {}{}",
            index + 1,
            settings.to_string(),
            route,
            port_note.dimmed()
        );
    }
}

fn print_json(candidates: &[ConnectionSettings]) -> Result<(), NotifierError> {
    let list: Vec<serde_json::Value> = candidates
        .iter()
        .map(|settings| {
            serde_json::json!({
                "host": settings.host,
                "address": settings.address.to_string(),
                "port": settings.port,
                "use_proxy": settings.use_proxy,
                "use_fake_tls_port": settings.use_fake_tls_port,
            })
        })
        .collect();

    let output = serde_json::to_string_pretty(&list)
        .map_err(|e| NotifierError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    println!("{}", output);
    Ok(())
}
