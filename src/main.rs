use std::io::{self, Read, Write};
use std::thread;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

use cli::Cli;
use spoofmon::{Detector, FlowRecord};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.build_config()?;
    let mut detector = Detector::new(&config)?;

    let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<u8>>(1024);
    let (flag_tx, flag_rx) = crossbeam_channel::bounded::<FlowRecord>(1024);

    // Reader and writer block on stdio; the detector core stays
    // single-threaded between the two channels.
    thread::spawn(move || read_frames(io::stdin(), frame_tx));
    let writer = thread::spawn(move || write_frames(io::stdout(), flag_rx));

    detector.run(&frame_rx, &flag_tx)?;

    // closing the sink lets the writer drain and flush
    drop(flag_tx);
    let _ = writer.join();

    Ok(())
}

/// Read length-prefixed frames (u16 big-endian length, then payload) and
/// hand them to the detector.
fn read_frames(input: impl Read, tx: Sender<Vec<u8>>) {
    let mut input = io::BufReader::new(input);
    let mut len_buf = [0u8; 2];

    loop {
        match input.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("input stream ended");
                break;
            }
            Err(e) => {
                error!("unable to read frame header: {}", e);
                break;
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        let mut frame = vec![0u8; len];
        if let Err(e) = input.read_exact(&mut frame) {
            error!("unable to read {}-byte frame: {}", len, e);
            break;
        }

        if tx.send(frame).is_err() {
            // detector is gone
            break;
        }
    }
}

/// Re-encode flagged records as length-prefixed frames.
fn write_frames(output: impl Write, rx: Receiver<FlowRecord>) {
    let mut output = io::BufWriter::new(output);

    for record in rx {
        let wire = record.encode();
        let len = (wire.len() as u16).to_be_bytes();
        let written = output
            .write_all(&len)
            .and_then(|()| output.write_all(&wire))
            .and_then(|()| output.flush());
        if let Err(e) = written {
            error!("unable to write flagged record: {}", e);
            return;
        }
    }

    let _ = output.flush();
}
