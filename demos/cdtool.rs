//! Mount a cue sheet, print its table of contents and optionally dump
//! sectors.

use std::path::PathBuf;

use cdsynth::cue;
use cdsynth::disc::LEADOUT_TRACK;
use cdsynth::reader::DiscSectorReader;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Inspect CUE/BIN disc images")]
struct Cli {
    /// Cue sheet to mount
    cue: PathBuf,

    /// First LBA to dump
    #[arg(long)]
    dump: Option<i32>,

    /// Number of sectors to dump
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Dump the subchannel data as well
    #[arg(long)]
    subchannel: bool,
}

fn hexdump(data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();

        println!("  {:04x}: {}", i * 16, hex.join(" "));
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let disc = match cue::open(&cli.cue) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Cue error: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", disc.name);

    if let Some(catalog) = disc.catalog() {
        println!("Catalog: {}", catalog);
    }

    for session in disc.sessions() {
        println!(
            "Session {} ({:?}), tracks {} to {}",
            session.number,
            session.toc.session_format,
            session.toc.first_recorded_track,
            session.toc.last_recorded_track
        );

        for track in &session.tracks {
            let name = match track.number {
                0 => "lead-in".to_string(),
                LEADOUT_TRACK => "lead-out".to_string(),
                n => format!("track {:02}", n),
            };

            let msf = track
                .msf()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "--:--:--".to_string());

            println!(
                "  {:<9} LBA {:>7} {} mode {} {:?}",
                name, track.lba, msf, track.mode, track.control
            );
        }
    }

    for w in disc.warnings() {
        println!("warning: {}", w);
    }

    let first = match cli.dump {
        Some(lba) => lba,
        None => return,
    };

    let mut reader = DiscSectorReader::new(&disc);
    let mut buf = [0u8; 2448];

    for lba in first..first + cli.count as i32 {
        let res = if cli.subchannel {
            reader.read_2448(lba, &mut buf)
        } else {
            reader.read_2352(lba, &mut buf)
        };

        match res {
            Ok(0) => println!("LBA {}: no sector", lba),
            Ok(n) => {
                println!("LBA {}:", lba);
                hexdump(&buf[..n]);
            }
            Err(e) => println!("LBA {}: {}", lba, e),
        }
    }
}
