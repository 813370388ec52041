use chrono::{Duration, Utc};
use opskit::bgp::replay::{origin_paths, unique_upstreams};
use opskit::bgp::Replayer;
use opskit::services::ripestat_client::RipeStatClient;
use opskit::utils::config::Config;
use opskit::utils::time_window::day_bounds;

fn main() {
    env_logger::init();

    println!("Testing opskit integration against RIPEstat...");

    let config = match Config::load(None) {
        Ok(config) => {
            println!("✓ Configuration loaded");
            config
        },
        Err(e) => {
            println!("✗ Failed to load configuration: {}", e);
            return;
        }
    };

    let (prefix, origin) = match (&config.bgp.prefix, &config.bgp.origin_asn) {
        (Some(prefix), Some(origin)) => (prefix.clone(), origin.clone()),
        _ => {
            println!("✗ [bgp] prefix and origin_asn must be configured");
            return;
        }
    };

    let client = match RipeStatClient::new(&config.ripestat) {
        Ok(client) => client,
        Err(e) => {
            println!("✗ Failed to create RIPEstat client: {}", e);
            return;
        }
    };

    let yesterday = (Utc::now() - Duration::days(1)).date_naive();
    let (start, end) = day_bounds(yesterday);

    match client.fetch_bgplay(&prefix, start, end, config.bgp.collectors.as_deref()) {
        Ok(data) => {
            println!("✓ BGPlay for {} on {}: {} initial paths, {} events",
                     prefix, yesterday, data.initial_state.len(), data.events.len());

            let replayer = Replayer::new(data.initial_state, data.events);
            let paths = replayer.active_at(end);
            let active = origin_paths(&paths, &origin);
            println!("  - {} paths end at AS{} by end of day", active.len(), origin);
            for asn in unique_upstreams(&active) {
                println!("  - upstream AS{}", asn);
            }
        },
        Err(e) => {
            println!("✗ Failed to fetch BGPlay data: {}", e);
        }
    }

    match client.announced_prefixes(&origin, start, end) {
        Ok(prefixes) => {
            let announced = prefixes.iter().any(|p| p == &prefix);
            println!("✓ AS{} announced {} prefixes (target {}: {})",
                     origin, prefixes.len(), prefix, if announced { "Yes" } else { "No" });
        },
        Err(e) => {
            println!("✗ Failed to fetch announced prefixes: {}", e);
        }
    }

    println!("BGPlay page: {}", client.bgplay_page_url(&prefix, start, end));
    println!("Integration test complete!");
}
