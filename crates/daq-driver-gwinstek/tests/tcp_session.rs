//! Integration tests for daq-driver-gwinstek over real loopback sockets.
//!
//! A fake instrument runs on a background thread behind a `TcpListener`. It
//! records every command line and answers through a per-test responder, so
//! these tests exercise the real `TcpStream` path: connect timeouts, framing of
//! replies split across TCP segments, read timeouts and teardown.

use daq_driver_gwinstek::{
    Endpoint, GpmError, InputRange, InstrumentSession, MeasurementVariable, Mode, SessionConfig,
    VariableSelection,
};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const IDENTITY: &str = "GW INSTEK,GPM-8213,GEW000001,1.01";

// =============================================================================
// Fake instrument
// =============================================================================

/// Background thread serving exactly one client.
struct FakeInstrument {
    addr: SocketAddr,
    handle: JoinHandle<Vec<String>>,
}

impl FakeInstrument {
    /// Spawn a fake instrument. `respond` maps a command line (terminator
    /// stripped) to the chunks to write back; every chunk is flushed
    /// separately with a short pause in between.
    fn spawn<F>(mut respond: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut commands = Vec::new();

            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let command = line.trim_end_matches(['\r', '\n']).to_string();
                let chunks = respond(&command);
                commands.push(command);
                for chunk in chunks {
                    if writer.write_all(chunk.as_bytes()).is_err() {
                        break;
                    }
                    let _ = writer.flush();
                    thread::sleep(Duration::from_millis(10));
                }
            }
            commands
        });

        Self { addr, handle }
    }

    /// Fake that answers `*IDN?` and replies `values` to every value query.
    fn answering(values: &'static str) -> Self {
        Self::spawn(move |command| match command {
            "*IDN?" => vec![format!("{IDENTITY}\r\n")],
            ":NUM:NORM:VALUE?" => vec![format!("{values}\r\n")],
            _ => Vec::new(),
        })
    }

    fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.addr.ip().to_string());
        config.port = self.addr.port();
        config.timeout_ms = 300;
        config
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Wait for the client to hang up and return what it sent.
    fn finish(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

fn vars(ids: &[&str]) -> Vec<MeasurementVariable> {
    MeasurementVariable::parse_list(ids).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn open_configure_read_and_close() {
    let fake = FakeInstrument::answering("+2.3010E+02,+1.2500E-01,+2.8763E+01");
    let mut config = fake.config();
    config.variables = vars(&["U", "I", "P"]);
    config.mode = Mode::Ac;
    config.current_range = 0.2;
    config.voltage_range = 300.0;

    let mut session = InstrumentSession::open(&config).unwrap();
    assert_eq!(session.identity(), IDENTITY);
    assert_eq!(session.pattern(), 0);

    let reading = session.trigger_and_read().unwrap();
    assert!(reading.is_complete());
    assert_eq!(reading.get("U"), Some(230.1));
    assert_eq!(reading.get("I"), Some(0.125));
    assert_eq!(reading.get("P"), Some(28.763));

    session.close();
    assert_eq!(
        fake.finish(),
        vec![
            "*IDN?",
            ":NUM:NORM:NUMB 3",
            ":NUM:NORM:ITEM1 U",
            ":NUM:NORM:ITEM2 I",
            ":NUM:NORM:ITEM3 P",
            ":INPUT:MODE AC",
            ":INP:VOLT:RANG 300V",
            ":INP:CURR:RANG 200mA",
            ":NUM:NORM:VALUE?",
            ":COMM:REM 0",
        ]
    );
}

#[test]
fn reply_split_across_segments_is_reassembled() {
    let fake = FakeInstrument::spawn(|command| match command {
        "*IDN?" => vec!["GW INSTEK,".into(), "GPM-8213,".into(), "GEW000001,1.01\r\n".into()],
        ":NUM:NORM:VALUE?" => vec!["1.5,2".into(), ".5\r".into(), "\n".into()],
        _ => Vec::new(),
    });

    let mut session = InstrumentSession::connect(fake.endpoint(), Duration::from_secs(1)).unwrap();
    assert_eq!(session.identity(), IDENTITY);
    session.set_variables(vars(&["U", "I"])).unwrap();
    let reading = session.trigger_and_read().unwrap();
    assert_eq!(reading.get("I"), Some(2.5));

    drop(session);
    assert_eq!(fake.finish().last().map(String::as_str), Some(":COMM:REM 0"));
}

#[test]
fn timeout_closes_session_and_releases_instrument() {
    let fake = FakeInstrument::spawn(|command| match command {
        "*IDN?" => vec![format!("{IDENTITY}\r\n")],
        _ => Vec::new(),
    });
    let mut session = InstrumentSession::open(&fake.config()).unwrap();

    let err = session.trigger_and_read().unwrap_err();
    assert!(matches!(err, GpmError::Timeout { .. }), "got {err:?}");
    assert!(err.is_disconnect());
    assert!(!session.is_connected());

    let err = session.set_mode(Mode::Dc).unwrap_err();
    assert!(matches!(err, GpmError::Connection { .. }));
    assert_eq!(session.mode(), Some(Mode::AcDc));

    drop(session);
    let commands = fake.finish();
    assert_eq!(commands.last().map(String::as_str), Some(":COMM:REM 0"));
    assert_eq!(commands.iter().filter(|c| *c == ":COMM:REM 0").count(), 1);
    assert!(!commands.contains(&":INPUT:MODE DC".to_string()));
}

#[test]
fn late_reply_does_not_answer_next_query() {
    // Every value query gets its own reply plus a duplicate of the previous one.
    let mut count = 0;
    let fake = FakeInstrument::spawn(move |command| match command {
        "*IDN?" => vec![format!("{IDENTITY}\r\n")],
        ":NUM:NORM:VALUE?" => {
            count += 1;
            vec![format!("{count}\r\n{count}\r\n")]
        }
        _ => Vec::new(),
    });

    let mut session = InstrumentSession::connect(fake.endpoint(), Duration::from_secs(1)).unwrap();
    session.set_variables(vars(&["P"])).unwrap();
    assert_eq!(session.trigger_and_read().unwrap().get("P"), Some(1.0));
    assert_eq!(session.trigger_and_read().unwrap().get("P"), Some(2.0));
    session.close();
    fake.finish();
}

#[test]
fn crest_factor_six_ranges_on_the_wire() {
    let fake = FakeInstrument::answering("0");
    let mut session = InstrumentSession::connect(fake.endpoint(), Duration::from_secs(1)).unwrap();
    session
        .configure(
            &VariableSelection::Pattern(2),
            Mode::Dc,
            InputRange::new(0.0025, 7.5, 6).unwrap(),
        )
        .unwrap();
    session.set_range(0.5, 75.0, 6).unwrap();
    session.close();

    let commands = fake.finish();
    assert_eq!(
        &commands[1..],
        &[
            ":NUM:NORM:PRES 2",
            ":INPUT:MODE DC",
            ":INP:VOLT:RANG 7.5V",
            ":INP:CURR:RANG 2.5mA",
            ":INP:VOLT:RANG 75V",
            ":INP:CURR:RANG 0.5A",
            ":COMM:REM 0",
        ]
    );
}

#[test]
fn connect_to_closed_port_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = InstrumentSession::connect(Endpoint::new("127.0.0.1", port), Duration::from_millis(500))
        .unwrap_err();
    match err {
        GpmError::Connection { endpoint, .. } => assert_eq!(endpoint, format!("127.0.0.1:{port}")),
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[test]
fn invalid_config_fails_before_connecting() {
    // Nothing listens here; validation must reject the config first.
    let mut config = SessionConfig::new("127.0.0.1");
    config.port = 9;
    config.variables = vars(&["U", "U"]);
    assert!(matches!(
        InstrumentSession::open(&config),
        Err(GpmError::DuplicateVariable(_))
    ));
}
