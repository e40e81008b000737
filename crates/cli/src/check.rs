// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `fvde check`: walk every logical volume's segments, verify the
//! resulting extent set, and emit one of three report forms (spec.md §6.6).

use std::collections::BTreeMap;

use fvde_store::sizing::{format_size, fvde_block_to_linux_sector, linux_sector_to_fvde_block};
use fvde_store::{LogicalVolumeStats, PhysicalVolumeStats, VolumeState};
use fvde_types::{AbortFlag, Extent};
use fvde_walker::{walk, ProcessingOrder, StopCondition, WalkOptions};
use serde::Serialize;

use crate::args::{CheckArgs, OrderArg, ReportFormat};
use crate::errors::CliError;
use crate::unlock;

const MAP_LINE_LIMIT: usize = 1000;

#[derive(Debug, Serialize)]
struct VolumeSummary {
    uuid: String,
    size_in_blocks: u64,
}

#[derive(Debug, Serialize)]
struct VolumeSection {
    physical_volumes: Vec<VolumeSummary>,
    logical_volumes: Vec<VolumeSummary>,
}

#[derive(Debug, Serialize)]
struct ProcessingSection {
    order: String,
    transactions_processed: u64,
    metadata_blocks_processed: u64,
}

#[derive(Debug, Serialize)]
struct AllocationSection {
    physical: BTreeMap<String, PhysicalVolumeStats>,
    logical: BTreeMap<String, LogicalVolumeStats>,
}

#[derive(Debug, Serialize)]
struct Report {
    volume: VolumeSection,
    processing: ProcessingSection,
    allocation: AllocationSection,
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn order_arg_to_processing_order(order: OrderArg) -> ProcessingOrder {
    match order {
        OrderArg::Ascending => ProcessingOrder::Ascending,
        OrderArg::Descending => ProcessingOrder::Descending,
        OrderArg::Physical => ProcessingOrder::Physical,
    }
}

fn uuid_string(uuid: &[u8; 16]) -> String {
    uuid::Uuid::from_bytes(*uuid).hyphenated().to_string()
}

pub fn run(args: &CheckArgs, abort: &AbortFlag) -> Result<(), CliError> {
    // `check` accepts credential flags but tolerates a locked volume,
    // reporting header/metadata-block state only for it (ambient CLI
    // surface, spec.md's "Locked-volume-aware partial report").
    let unlocker = unlock::resolve(&args.source, args.offset, &args.unlock, false)?;

    let options = WalkOptions { order: order_arg_to_processing_order(args.order), stop: StopCondition::None };
    let (state, walk_report) = walk(&unlocker, &options, abort)?;

    if let Some(sector) = args.lookup_linux_sector {
        print_lookup(&state, sector);
        return Ok(());
    }

    match args.format {
        ReportFormat::Human => print_human(&state),
        ReportFormat::Map => print_map(&state, args.verbose),
        ReportFormat::Json => print_json(&state, &walk_report)?,
    }

    Ok(())
}

fn print_human(state: &VolumeState) {
    let stats = state.recompute_statistics();
    for (i, pv) in state.physical_volumes().iter().enumerate() {
        let s = stats.physical[i];
        println!(
            "physical volume {i} ({}): reserved {} allocated {} free {} of {} total",
            uuid_string(&pv.uuid),
            format_size(s.reserved_blocks * state.block_size as u64),
            format_size(s.allocated_blocks * state.block_size as u64),
            format_size(s.free_blocks * state.block_size as u64),
            format_size(pv.size_in_blocks * state.block_size as u64),
        );
    }
    for (i, lv) in state.logical_volumes().iter().enumerate() {
        let s = stats.logical[i];
        println!(
            "logical volume {i} ({}): mapped {} unmapped {}",
            uuid_string(&lv.uuid),
            format_size(s.mapped_blocks * state.block_size as u64),
            format_size(s.unmapped_blocks * state.block_size as u64),
        );
    }
}

fn print_map(state: &VolumeState, verbose: bool) {
    print_human(state);
    for (i, pv) in state.physical_volumes().iter().enumerate() {
        println!("-- physical volume {i} extents --");
        let limit = if verbose { usize::MAX } else { MAP_LINE_LIMIT };
        for extent in pv.extents().iter().take(limit) {
            print_extent_line(extent);
        }
        if !verbose && pv.extents().len() > MAP_LINE_LIMIT {
            println!("... {} more extents omitted (pass --verbose to show all)", pv.extents().len() - MAP_LINE_LIMIT);
        }
    }
}

fn print_extent_line(extent: &Extent) {
    let (start, count) = match extent {
        Extent::Free { phys_start, phys_count, .. }
        | Extent::Allocated { phys_start, phys_count, .. }
        | Extent::Reserved { phys_start, phys_count, .. } => (*phys_start, *phys_count),
        Extent::Unknown => return,
    };
    match extent {
        Extent::Reserved { description, .. } => println!("[{start}..{}) reserved: {description}", start + count),
        Extent::Allocated { lv, logical_start, .. } => {
            println!("[{start}..{}) allocated: lv {lv} logical [{logical_start}..{})", start + count, logical_start + count)
        }
        Extent::Free { .. } => println!("[{start}..{}) free", start + count),
        Extent::Unknown => {}
    }
}

fn print_json(state: &VolumeState, walk_report: &fvde_walker::WalkReport) -> Result<(), CliError> {
    let stats = state.recompute_statistics();

    let report = Report {
        volume: VolumeSection {
            physical_volumes: state
                .physical_volumes()
                .iter()
                .map(|pv| VolumeSummary { uuid: uuid_string(&pv.uuid), size_in_blocks: pv.size_in_blocks })
                .collect(),
            logical_volumes: state
                .logical_volumes()
                .iter()
                .map(|lv| VolumeSummary { uuid: uuid_string(&lv.uuid), size_in_blocks: lv.size_in_blocks })
                .collect(),
        },
        processing: ProcessingSection {
            order: walk_report.order.to_string(),
            transactions_processed: walk_report.transactions_processed,
            metadata_blocks_processed: walk_report.metadata_blocks_processed,
        },
        allocation: AllocationSection {
            physical: stats.physical.iter().enumerate().map(|(i, s)| (i.to_string(), *s)).collect(),
            logical: stats.logical.iter().enumerate().map(|(i, s)| (i.to_string(), *s)).collect(),
        },
        errors: walk_report.errors.clone(),
        warnings: walk_report.warnings.clone(),
    };

    let json = serde_json::to_string_pretty(&report).map_err(|e| CliError::InvalidArgument(format!("serializing report: {e}")))?;
    println!("{json}");
    Ok(())
}

fn print_lookup(state: &VolumeState, linux_sector: u64) {
    let block = linux_sector_to_fvde_block(linux_sector, state.block_size);
    println!("linux sector {linux_sector} -> fvde block {block} (block size {})", state.block_size);

    let Some(extent) = state.find_physical_extent(0, block) else {
        println!("block {block} is not covered by any known extent on physical volume 0");
        return;
    };

    match extent {
        Extent::Reserved { phys_start, phys_count, description, .. } => {
            println!("state: reserved ({description})");
            println!(
                "physical extent: [{phys_start}..{}) (sectors [{}..{}))",
                phys_start + phys_count,
                fvde_block_to_linux_sector(*phys_start, state.block_size),
                fvde_block_to_linux_sector(phys_start + phys_count, state.block_size)
            );
        }
        Extent::Allocated { phys_start, phys_count, lv, logical_start, provenance, .. } => {
            println!("state: allocated");
            if let Some(p) = provenance {
                println!("provenance: transaction {} metadata block {} type 0x{:04x}", p.transaction_id, p.metadata_block_index, p.block_type);
            }
            println!(
                "physical extent: [{phys_start}..{}) (sectors [{}..{}))",
                phys_start + phys_count,
                fvde_block_to_linux_sector(*phys_start, state.block_size),
                fvde_block_to_linux_sector(phys_start + phys_count, state.block_size)
            );
            println!("logical volume {lv} extent: [{logical_start}..{})", logical_start + phys_count);
        }
        Extent::Free { phys_start, phys_count, .. } => {
            println!("state: free");
            println!("physical extent: [{phys_start}..{})", phys_start + phys_count);
        }
        Extent::Unknown => println!("state: unknown"),
    }
}
