use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use linebank::{AppConfig, LineRegistry};

#[cfg(feature = "hardware-gpio")]
use linebank::LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
use linebank::MockBackend;

fn usage() -> ! {
    eprintln!("Usage: linebank [config.json] <line> <command>...");
    eprintln!("Commands: out, in, 1, 0, rising, falling, disable-irq, read [count], watch");
    std::process::exit(2);
}

fn main() {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let config_path = if args.first().is_some_and(|a| a.ends_with(".json")) {
        Some(args.remove(0))
    } else {
        std::env::var("LINEBANK_CONFIG").ok()
    };
    let config = Arc::new(match config_path {
        Some(path) => {
            AppConfig::load_from_file(&path).unwrap_or_else(|e| panic!("Failed to load config: {e}"))
        }
        None => AppConfig::default(),
    });

    let backend = {
        #[cfg(feature = "hardware-gpio")]
        {
            Arc::new(LibgpiodBackend::new(config.chip.clone()))
        }
        #[cfg(not(feature = "hardware-gpio"))]
        {
            Arc::new(MockBackend::default())
        }
    };

    let registry = LineRegistry::initialize(config.clone(), backend)
        .unwrap_or_else(|e| panic!("Failed to initialize line registry: {e}"));

    let mut rest = args.into_iter();
    let Some(line_arg) = rest.next() else { usage() };
    let Ok(line_id) = line_arg.parse::<u32>() else {
        usage()
    };

    let commands: Vec<String> = rest.collect();
    if commands.is_empty() {
        usage();
    }

    let mut handle = registry
        .open(line_id)
        .unwrap_or_else(|e| panic!("Failed to open line {line_id}: {e}"));

    let mut i = 0;
    while i < commands.len() {
        match commands[i].as_str() {
            "read" => {
                let count = commands.get(i + 1).and_then(|c| c.parse::<usize>().ok());
                if count.is_some() {
                    i += 1;
                }
                match handle.read(count.unwrap_or(1)) {
                    Ok(samples) => println!("{samples}"),
                    Err(e) => {
                        eprintln!("read: {e}");
                        std::process::exit(1);
                    }
                }
            }
            "watch" => {
                let mut events = registry.subscribe();
                loop {
                    match events.blocking_recv() {
                        Ok(event) => {
                            if let Ok(text) = serde_json::to_string(&event) {
                                println!("{text}");
                            }
                        }
                        Err(RecvError::Lagged(n)) => eprintln!("event stream lagged by {n}"),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            command => {
                if let Err(e) = handle.write(command) {
                    eprintln!("write {command}: {e}");
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }
}
