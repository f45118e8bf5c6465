use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hotel_reservas::engine::{Engine, EngineConfig, EngineError};
use hotel_reservas::model::{parse_day, Day, GuestId, ReservationId, RoomId};
use hotel_reservas::store::WalStore;

/// Hotel reservation engine: one operation per invocation, result printed as JSON.
#[derive(Parser, Debug)]
#[command(name = "hotel-reservas", version)]
struct Cli {
    /// Directory holding the write-ahead log.
    #[arg(long, env = "HOTEL_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Compact the log once this many records accumulate.
    #[arg(long, env = "HOTEL_COMPACT_THRESHOLD", default_value_t = 1000)]
    compact_threshold: u64,

    /// Serve Prometheus metrics on this port while the command runs.
    #[arg(long, env = "HOTEL_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Room(RoomCommand),
    #[command(subcommand)]
    Guest(GuestCommand),
    /// Book a room for [check_in, check_out).
    Reserve {
        guest: GuestId,
        room: RoomId,
        #[arg(value_parser = parse_day)]
        check_in: Day,
        #[arg(value_parser = parse_day)]
        check_out: Day,
    },
    Cancel {
        id: ReservationId,
    },
    Finalize {
        id: ReservationId,
    },
    /// Rooms free for the whole range.
    Available {
        #[arg(value_parser = parse_day)]
        check_in: Day,
        #[arg(value_parser = parse_day)]
        check_out: Day,
    },
    Quote {
        room: RoomId,
        #[arg(value_parser = parse_day)]
        check_in: Day,
        #[arg(value_parser = parse_day)]
        check_out: Day,
    },
    Reservations {
        /// Matches guest name, room number or status.
        filter: Option<String>,
        #[arg(long, conflicts_with_all = ["filter", "room"])]
        guest: Option<GuestId>,
        #[arg(long, conflicts_with = "filter")]
        room: Option<RoomId>,
    },
    Summary,
    /// Re-derive every room's status for today.
    Refresh,
}

#[derive(Subcommand, Debug)]
enum RoomCommand {
    Add {
        number: String,
        room_type: String,
        rate: Decimal,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        filter: Option<String>,
    },
    Update {
        id: RoomId,
        number: String,
        room_type: String,
        rate: Decimal,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: RoomId,
    },
}

#[derive(Subcommand, Debug)]
enum GuestCommand {
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    List {
        filter: Option<String>,
    },
    Update {
        id: GuestId,
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Delete {
        id: GuestId,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    hotel_reservas::observability::init(cli.metrics_port)?;

    std::fs::create_dir_all(&cli.data_dir)?;
    let wal_path = cli.data_dir.join("hotel.wal");
    let store = Arc::new(WalStore::open(&wal_path)?);
    let config = EngineConfig::from_env();
    info!("data: {}, lock timeout: {:?}", wal_path.display(), config.lock_timeout);
    let engine = Engine::new(store.clone(), config);

    let outcome = run(&engine, cli.command).await;
    if let Ok(value) = &outcome {
        println!("{}", serde_json::to_string_pretty(value)?);
    }

    // The command's outcome is already final; a failed compaction only leaves the log long.
    if store.appends_since_compact().await >= cli.compact_threshold {
        if let Err(e) = compact(&engine, &store).await {
            warn!("compaction skipped: {e}");
        }
    }

    if let Err(e) = outcome {
        error!("{e}");
        eprintln!("error: {e}");
        // EX_TEMPFAIL for contention, so scripts know to retry
        std::process::exit(if e.is_retryable() { 75 } else { 1 });
    }
    Ok(())
}

async fn compact(engine: &Engine, store: &WalStore) -> Result<(), EngineError> {
    let _pause = engine.pause_writes().await?;
    store.compact().await?;
    Ok(())
}

fn json<T: Serialize>(value: T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Aborted(e.to_string()))
}

async fn run(engine: &Engine, command: Command) -> Result<serde_json::Value, EngineError> {
    match command {
        Command::Room(cmd) => match cmd {
            RoomCommand::Add {
                number,
                room_type,
                rate,
                description,
            } => json(
                engine
                    .register_room(&number, &room_type, rate, description.as_deref())
                    .await?,
            ),
            RoomCommand::List { filter } => json(engine.list_rooms(filter.as_deref()).await?),
            RoomCommand::Update {
                id,
                number,
                room_type,
                rate,
                description,
            } => json(
                engine
                    .update_room(id, &number, &room_type, rate, description.as_deref())
                    .await?,
            ),
            RoomCommand::Delete { id } => json(engine.delete_room(id).await?),
        },
        Command::Guest(cmd) => match cmd {
            GuestCommand::Add { name, phone, email } => json(
                engine
                    .register_guest(&name, phone.as_deref(), email.as_deref())
                    .await?,
            ),
            GuestCommand::List { filter } => json(engine.list_guests(filter.as_deref()).await?),
            GuestCommand::Update {
                id,
                name,
                phone,
                email,
            } => json(
                engine
                    .update_guest(id, &name, phone.as_deref(), email.as_deref())
                    .await?,
            ),
            GuestCommand::Delete { id } => json(engine.delete_guest(id).await?),
        },
        Command::Reserve {
            guest,
            room,
            check_in,
            check_out,
        } => json(engine.create_reservation(guest, room, check_in, check_out).await?),
        Command::Cancel { id } => json(engine.cancel_reservation(id).await?),
        Command::Finalize { id } => json(engine.finalize_reservation(id).await?),
        Command::Available { check_in, check_out } => {
            json(engine.query_availability(check_in, check_out).await?)
        }
        Command::Quote {
            room,
            check_in,
            check_out,
        } => json(engine.quote(room, check_in, check_out).await?),
        Command::Reservations { filter, guest, room } => match (guest, room) {
            (Some(guest), _) => json(engine.reservations_for_guest(guest).await?),
            (None, Some(room)) => json(engine.reservations_for_room(room).await?),
            (None, None) => json(engine.list_reservations(filter.as_deref()).await?),
        },
        Command::Summary => json(engine.summary().await?),
        Command::Refresh => json(engine.refresh_occupancy().await?),
    }
}
