//! Subcommand implementations. Output goes to any writer so it can be
//! checked in tests.

use std::io::Write;

use anyhow::Context;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use xferlog_shared::{PeerId, TransferId};
use xferlog_store::clock::{format_timestamp, parse_timestamp};
use xferlog_store::{Database, PathDump, PathStage, TransferDump, TransferStage};

use crate::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

pub fn run(db: &Database, command: Command, format: Format, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Peers => {
            let peers = db.list_peers()?;
            if format == Format::Json {
                return write_json(out, &peers);
            }
            let mut table = table(vec!["Peer", "First seen"]);
            for peer in peers {
                table.add_row(vec![peer.id.to_string(), format_timestamp(&peer.created_at)]);
            }
            writeln!(out, "{table}")?;
        }
        Command::Transfers { peer } => {
            let peer = PeerId::from(peer);
            let mut rows = Vec::new();
            for transfer in db.list_transfers_for_peer(&peer)? {
                let state = db.transfer_state(&transfer.id)?;
                rows.push((transfer, state));
            }
            if format == Format::Json {
                let json: Vec<_> = rows
                    .iter()
                    .map(|(transfer, state)| serde_json::json!({ "transfer": transfer, "state": state }))
                    .collect();
                return write_json(out, &json);
            }
            let mut table = table(vec!["Transfer", "Direction", "Created", "State"]);
            for (transfer, state) in rows {
                table.add_row(vec![
                    transfer.id.to_string(),
                    transfer.direction.to_string(),
                    format_timestamp(&transfer.created_at),
                    state.state.to_string(),
                ]);
            }
            writeln!(out, "{table}")?;
        }
        Command::Show { transfer_id } => {
            let dump = db.transfer_dump(&TransferId::from(transfer_id))?;
            if format == Format::Json {
                return write_json(out, &dump);
            }
            write_dump(out, &dump)?;
        }
        Command::History { transfer_id, path } => {
            let transfer_id = TransferId::from(transfer_id);
            match path {
                Some(path_id) => {
                    let events = db.path_history(&transfer_id, &path_id)?;
                    if format == Format::Json {
                        return write_json(out, &events);
                    }
                    let mut table = table(vec!["At", "Stage", "Detail"]);
                    for event in events {
                        table.add_row(vec![
                            format_timestamp(&event.created_at),
                            event.stage.name().to_string(),
                            path_detail(&event.stage),
                        ]);
                    }
                    writeln!(out, "{table}")?;
                }
                None => {
                    let events = db.transfer_history(&transfer_id)?;
                    if format == Format::Json {
                        return write_json(out, &events);
                    }
                    let mut table = table(vec!["At", "Stage", "Detail"]);
                    for event in events {
                        table.add_row(vec![
                            format_timestamp(&event.created_at),
                            event.stage.name().to_string(),
                            transfer_detail(&event.stage),
                        ]);
                    }
                    writeln!(out, "{table}")?;
                }
            }
        }
        Command::Since { timestamp } => {
            let since = parse_timestamp(&timestamp)
                .with_context(|| format!("invalid timestamp {timestamp:?}, expected YYYY-MM-DD HH:MM:SS[.fff]"))?;
            let dumps = db.transfers_since(since)?;
            if format == Format::Json {
                return write_json(out, &dumps);
            }
            for dump in &dumps {
                write_dump(out, dump)?;
            }
        }
        Command::PeerRemove { peer } => {
            let peer = PeerId::from(peer);
            db.remove_peer(&peer)?;
            tracing::info!(peer_id = %peer, "peer removed");
            if format == Format::Json {
                return write_json(out, &serde_json::json!({ "removed": peer }));
            }
            writeln!(out, "removed peer {peer}")?;
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn write_dump(out: &mut impl Write, dump: &TransferDump) -> anyhow::Result<()> {
    let transfer = &dump.transfer;
    writeln!(
        out,
        "\nTransfer {} ({}, peer {}, created {}): {}\n",
        transfer.id,
        transfer.direction,
        transfer.peer_id,
        format_timestamp(&transfer.created_at),
        dump.state.state,
    )?;

    let mut table = table(vec!["Path id", "Path", "Bytes", "State", "Final path", "Flags"]);
    for PathDump { path, state, .. } in &dump.paths {
        let flags = if state.is_consistent() {
            String::new()
        } else {
            format!("{} counter regression(s)", state.regressions.len())
        };
        table.add_row(vec![
            path.path_id.clone(),
            path.path.clone(),
            format!("{}/{}", state.bytes, path.bytes),
            state.state.to_string(),
            state.final_path.clone().unwrap_or_default(),
            flags,
        ]);
    }
    writeln!(out, "{table}")?;
    Ok(())
}

fn transfer_detail(stage: &TransferStage) -> String {
    match stage {
        TransferStage::Active => String::new(),
        TransferStage::Cancelled { by_peer } => by_peer_detail(*by_peer).to_string(),
        TransferStage::Failed { status_code } => format!("status {status_code}"),
    }
}

fn path_detail(stage: &PathStage) -> String {
    match stage {
        PathStage::Pending => String::new(),
        PathStage::Started { bytes } => format!("{bytes} bytes"),
        PathStage::Cancelled { by_peer, bytes } => format!("{}, {bytes} bytes", by_peer_detail(*by_peer)),
        PathStage::Failed { status_code, bytes } => format!("status {status_code}, {bytes} bytes"),
        PathStage::Completed { final_path } => final_path.clone().unwrap_or_default(),
    }
}

fn by_peer_detail(by_peer: bool) -> &'static str {
    if by_peer {
        "by peer"
    } else {
        "locally"
    }
}
