//! `relay records`: the registry-side glue around the record store.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::{Employee, FileStore, NewEmployee, RecordId, RecordStore};
use relay_publish::PublishOutcome;
use relay_sync::pipeline;

#[derive(Subcommand, Debug)]
pub enum RecordsCommand {
    /// Insert a new (unsynced) employee record.
    Add(AddArgs),
    /// List stored records.
    List(ListArgs),
    /// Clear the synced flag so records are sent again by the next run.
    Resync(ResyncArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long)]
    pub age: u32,
    #[arg(long)]
    pub department: String,
    #[arg(long)]
    pub post: Option<String>,
    /// Explicit personal code; generated as EMP-<ts>-<hex> when omitted.
    #[arg(long)]
    pub personal_code: Option<String>,
    /// Also send an EMPLOYEE_CREATED event right away.
    #[arg(long)]
    pub publish: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only records not yet synced.
    #[arg(long)]
    pub unsynced: bool,
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ResyncArgs {
    /// Record ids to re-offer.
    pub ids: Vec<u64>,
    /// Re-offer every record.
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,
}

pub fn run(command: RecordsCommand) -> Result<()> {
    let home = super::home()?;
    let config = super::load_config(&home)?;
    let runtime = super::runtime()?;

    match command {
        RecordsCommand::Add(args) => runtime.block_on(async move {
            let pipeline = pipeline::assemble(&home, &config);
            let new = NewEmployee {
                personal_code: args.personal_code,
                first_name: args.first_name,
                last_name: args.last_name,
                age: args.age,
                department: args.department,
                post: args.post,
                ..NewEmployee::default()
            };
            let inserted = pipeline.store.insert(new).await;
            let outcome = match &inserted {
                Ok(employee) if args.publish => Some(pipeline.publisher.publish_created(employee)),
                _ => None,
            };
            pipeline.close().await;

            let employee = inserted.context("failed to insert record")?;
            println!(
                "✓ Added #{} {} ({}, {})",
                employee.id,
                employee.full_name(),
                employee.personal_code,
                employee.department
            );
            match outcome {
                Some(PublishOutcome::Enqueued { key, .. }) => {
                    println!("  created event enqueued (key {key})")
                }
                Some(PublishOutcome::Rejected { reason }) => {
                    println!("  {} created event not sent: {reason}", "!".yellow().bold())
                }
                None => {}
            }
            Ok::<(), anyhow::Error>(())
        }),
        RecordsCommand::List(args) => {
            let store = FileStore::open(config.store_path(&home), config.store.batch_size);
            let mut records = runtime
                .block_on(store.list())
                .with_context(|| format!("failed to read {}", store.path().display()))?;
            if args.unsynced {
                records.retain(|record| !record.synced);
            }
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records)
                        .context("failed to serialize records JSON")?
                );
            } else {
                print_table(&records);
            }
            Ok(())
        }
        RecordsCommand::Resync(args) => {
            if !args.all && args.ids.is_empty() {
                bail!("provide record ids or use --all");
            }
            let store = FileStore::open(config.store_path(&home), config.store.batch_size);
            let ids: Vec<RecordId> = args.ids.into_iter().map(RecordId).collect();
            let selection = if args.all { None } else { Some(ids.as_slice()) };
            let reset = runtime
                .block_on(store.reset_synced(selection))
                .context("failed to reset synced flags")?;
            println!("✓ {reset} record(s) will be sent by the next sync run");
            Ok(())
        }
    }
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "personal code")]
    personal_code: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "age")]
    age: u32,
    #[tabled(rename = "department")]
    department: String,
    #[tabled(rename = "post")]
    post: String,
    #[tabled(rename = "synced")]
    synced: String,
}

fn print_table(records: &[Employee]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    let unsynced = records.iter().filter(|r| !r.synced).count();
    let rows: Vec<RecordRow> = records
        .iter()
        .map(|record| RecordRow {
            id: record.id.0,
            personal_code: record.personal_code.clone(),
            name: record.full_name(),
            age: record.age,
            department: record.department.clone(),
            post: record.post.clone().unwrap_or_default(),
            synced: match record.synced_at {
                Some(at) if record.synced => at.format("%Y-%m-%d %H:%M:%S").to_string(),
                _ => "no".to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{} records, {} unsynced", records.len(), unsynced);
}
