use std::sync::Arc;

use linebank::{
    AppConfig, Direction, Level, LineError, LineRegistry, MAX_LINE_NUMBER, MockBackend,
    RESERVED_LINES,
};

fn sample_config() -> AppConfig {
    serde_json::from_str(
        r#"
        {
            "chip": "/dev/gpiochip0",
            "debounce_window_ms": 200,
            "broadcast_capacity": 16
        }
        "#,
    )
    .expect("valid sample config")
}

fn setup() -> (Arc<MockBackend>, LineRegistry<MockBackend>) {
    let backend = Arc::new(MockBackend::default());
    let registry = LineRegistry::initialize(Arc::new(sample_config()), backend.clone())
        .expect("registry initializes");
    (backend, registry)
}

#[test]
fn fresh_line_reads_low() {
    let (_backend, registry) = setup();
    let handle = registry.open(4).expect("open line 4");

    assert_eq!(handle.read(1).expect("read"), "0");
    assert_eq!(handle.read(3).expect("read"), "000");
}

#[test]
fn reserved_and_out_of_range_ids_rejected() {
    let (_backend, registry) = setup();

    for id in RESERVED_LINES {
        let err = registry.open(id).err().expect("reserved id must fail");
        assert!(matches!(err, LineError::UnknownLine(unknown) if unknown == id));
    }
    assert!(matches!(
        registry.open(MAX_LINE_NUMBER),
        Err(LineError::UnknownLine(_))
    ));
    assert!(matches!(registry.open(99), Err(LineError::UnknownLine(99))));
}

#[test]
fn drive_then_read_roundtrip() {
    let (_backend, registry) = setup();
    let mut handle = registry.open(18).expect("open");

    handle.write("out").expect("set output");
    handle.write("1").expect("drive high");
    assert_eq!(handle.read(1).expect("read"), "1");

    handle.write("0").expect("drive low");
    assert_eq!(handle.read(1).expect("read"), "0");
}

#[test]
fn drive_rejected_while_input() {
    let (_backend, registry) = setup();
    let mut handle = registry.open(7).expect("open");

    handle.write("in").expect("set input");
    let err = handle.write("1").expect_err("driving an input must fail");
    assert!(matches!(err, LineError::InvalidOperation(_)));

    let state = registry.resolve(7).expect("resolve").snapshot();
    assert_eq!(state.direction, Direction::Input);
    assert_eq!(state.level, Level::Low);
}

#[test]
fn unknown_command_leaves_state_unchanged() {
    let (_backend, registry) = setup();
    let mut handle = registry.open(5).expect("open");

    handle.write("1").expect("drive high");
    let before = handle.read(1).expect("read before");

    let err = handle.write("toggle").expect_err("unknown command");
    assert!(matches!(err, LineError::InvalidCommand(_)));

    assert_eq!(handle.read(1).expect("read after"), before);
    let state = registry.resolve(5).expect("resolve").snapshot();
    assert_eq!(state.direction, Direction::Output);
    assert_eq!(state.level, Level::High);
}

#[test]
fn write_consumes_whole_buffer() {
    let (_backend, registry) = setup();
    let mut handle = registry.open(11).expect("open");

    assert_eq!(handle.write("out\n").expect("write"), 4);
    assert_eq!(handle.write("in").expect("write"), 2);
}

#[test]
fn input_reads_sensed_level() {
    let (backend, registry) = setup();
    let mut handle = registry.open(9).expect("open");

    handle.write("in").expect("set input");
    backend.set_sensed(9, Level::High).expect("sense high");
    assert_eq!(handle.read(2).expect("read"), "11");

    backend.set_sensed(9, Level::Low).expect("sense low");
    assert_eq!(handle.read(1).expect("read"), "0");
}

#[test]
fn out_resets_level_low() {
    let (_backend, registry) = setup();
    let mut handle = registry.open(10).expect("open");

    handle.write("1").expect("drive high");
    handle.write("in").expect("set input");
    handle.write("out").expect("back to output");

    assert_eq!(handle.read(1).expect("read"), "0");
    let state = registry.resolve(10).expect("resolve").snapshot();
    assert_eq!(state.direction, Direction::Output);
    assert_eq!(state.level, Level::Low);
}

#[test]
fn initialize_claims_every_managed_line() {
    let (backend, registry) = setup();

    for id in 0..MAX_LINE_NUMBER {
        let expected = !RESERVED_LINES.contains(&id);
        assert_eq!(backend.is_claimed(id).expect("claim check"), expected);
    }
    drop(registry);
}

#[test]
fn claim_failure_aborts_initialize() {
    let backend = Arc::new(MockBackend::default());
    backend.fail_claim(5);

    let err = LineRegistry::initialize(Arc::new(sample_config()), backend.clone())
        .expect_err("claim failure is fatal");
    assert!(matches!(err, LineError::Hardware(_)));

    // every claim taken before the failure is rolled back
    for id in 0..MAX_LINE_NUMBER {
        assert!(!backend.is_claimed(id).expect("claim check"));
    }
}

#[test]
fn shutdown_releases_all_lines() {
    let (backend, registry) = setup();
    {
        let mut handle = registry.open(4).expect("open");
        handle.write("1").expect("drive high");
    }

    registry.shutdown();
    for id in 0..MAX_LINE_NUMBER {
        assert!(!backend.is_claimed(id).expect("claim check"));
    }
}

#[test]
fn registry_drop_shuts_down() {
    let (backend, registry) = setup();
    drop(registry);

    for id in 0..MAX_LINE_NUMBER {
        assert!(!backend.is_claimed(id).expect("claim check"));
    }
}

#[test]
fn config_defaults_apply() {
    let config: AppConfig = serde_json::from_str("{}").expect("empty config");
    assert_eq!(config.chip, "/dev/gpiochip0");
    assert_eq!(config.debounce_window_ms, 200);
    assert_eq!(config.broadcast_capacity, 64);
}

#[test]
fn concurrent_clients_on_disjoint_lines() {
    let (_backend, registry) = setup();

    std::thread::scope(|s| {
        for id in [2u32, 3, 14, 15] {
            let registry = &registry;
            s.spawn(move || {
                let mut handle = registry.open(id).expect("open");
                for _ in 0..50 {
                    handle.write("1").expect("drive high");
                    handle.write("0").expect("drive low");
                }
                assert_eq!(handle.read(1).expect("read"), "0");
            });
        }
    });
}
