//! Headless chain-selector daemon.
//!
//! Wires the OSC client, router, chain manager, and MIDI navigator
//! together and pumps them on a single thread. A GUI front end would
//! consume the same status and state subscriptions this loop drains.

use std::fs::File;
use std::time::{Duration, Instant};

use log::{info, warn};

use chainsel_core::chain::{discover, make_strategy, ChainManager};
use chainsel_core::config::AppConfig;
use chainsel_core::midi::{MidiInputManager, NavigatorOutput, PadNavigator};
use chainsel_osc::{OscClient, OscRouter};
use chainsel_types::{ConnectionStatus, LearnTarget, RackDevice};

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("chainsel")
        .join("chainsel.log");
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Ok(file) = File::create(&log_path) {
        loggers.push(WriteLogger::new(log_level, Config::default(), file));
    }

    CombinedLogger::init(loggers).expect("Failed to initialize logger");

    log::info!("chainsel starting (log level: {:?})", log_level);
}

fn parse_learn_target(args: &[String]) -> Option<LearnTarget> {
    let value = args
        .iter()
        .position(|a| a == "--learn")
        .and_then(|i| args.get(i + 1))?;
    match value.as_str() {
        "prev" | "previous" => Some(LearnTarget::Previous),
        "next" => Some(LearnTarget::Next),
        other => {
            warn!("unknown learn target '{}', expected prev or next", other);
            None
        }
    }
}

fn parse_rack_arg(args: &[String]) -> Option<(i32, i32)> {
    let i = args.iter().position(|a| a == "--rack")?;
    let track = args.get(i + 1).and_then(|s| s.parse().ok())?;
    let device = args.get(i + 2).and_then(|s| s.parse().ok())?;
    Some((track, device))
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let discover_mode = args.iter().any(|a| a == "--discover");
    let learn_target = parse_learn_target(&args);

    let mut config = AppConfig::load();
    if let Some((track, device)) = parse_rack_arg(&args) {
        config.track_id = Some(track);
        config.device_id = Some(device);
        config.save();
    }

    let mut osc = OscClient::new(&config.send_host, config.send_port, config.receive_port);
    let mut router = OscRouter::new();
    let mut manager = ChainManager::new(make_strategy(config.strategy));
    let mut navigator = PadNavigator::new(config.pads);

    let mut midi = MidiInputManager::new();
    midi.refresh_ports();
    for port in midi.list_ports() {
        info!("MIDI input available: {}", port.name);
    }
    if let Some(name) = config.midi_port.clone() {
        if let Err(e) = midi.connect_by_name(&name) {
            warn!("could not reopen MIDI port: {}", e);
        }
    } else if !midi.list_ports().is_empty() {
        let _ = midi.connect(0);
    }

    let status_rx = osc.subscribe_status();
    let state_rx = manager.subscribe();

    osc.connect()?;

    if discover_mode {
        return run_discovery(&mut osc);
    }

    if let Some(target) = learn_target {
        navigator.start_learn(target);
        info!("learn armed for {:?}: press a pad", target);
    }

    loop {
        osc.tick();
        for msg in osc.poll() {
            router.route(&msg);
        }
        manager.poll(&mut osc);

        while let Ok(status) = status_rx.try_recv() {
            info!("connection: {:?}", status);
            // The peer (re)appeared: restore the persisted rack and the
            // last active chain on it.
            if status == ConnectionStatus::Connected {
                if let (Some(track), Some(device)) = (config.track_id, config.device_id) {
                    manager.set_rack(RackDevice::from_ids(track, device), &mut osc, &mut router);
                    if config.last_chain >= 0 {
                        manager.select_chain(config.last_chain, &osc);
                    }
                }
            }
        }

        for event in midi.poll_events() {
            match navigator.handle_message(&event) {
                Some(NavigatorOutput::Previous) => manager.select_previous(&osc),
                Some(NavigatorOutput::Next) => manager.select_next(&osc),
                Some(NavigatorOutput::LearnComplete { target, config: pads }) => {
                    info!("learned {:?} pad mapping", target);
                    config.pads = pads;
                    config.save();
                }
                None => {}
            }
        }

        while let Ok(state) = state_rx.try_recv() {
            if state.active_chain_index >= 0 {
                if let Some(chain) = state.chains.get(state.active_chain_index as usize) {
                    info!("active chain {} ({})", chain.index, chain.name);
                }
            }
            config.last_chain = state.active_chain_index;
            config.save();
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}

/// One-shot scan: wait for the peer, print the rack table, exit.
fn run_discovery(osc: &mut OscClient) -> std::io::Result<()> {
    let deadline = Instant::now() + Duration::from_secs(6);
    while Instant::now() < deadline {
        osc.tick();
        osc.poll();
        if osc.status() == ConnectionStatus::Connected {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    if osc.status() != ConnectionStatus::Connected {
        warn!("peer not reachable; the scan may come back empty");
    }

    let racks = discover(osc);
    if racks.is_empty() {
        println!("No chain-capable devices found.");
    } else {
        for rack in &racks {
            println!(
                "track {:>2} device {:>2}  {} / {}",
                rack.track_id, rack.device_id, rack.track_name, rack.device_name
            );
        }
    }

    osc.disconnect();
    Ok(())
}
