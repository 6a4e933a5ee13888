use std::fs;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches, SubCommand};
use serde::Serialize;

use riscv_taint::interpreter::{Interpreter, StepOutcome};
use riscv_taint::policy::Policy;
use riscv_taint::program::default_function_table;
use riscv_taint::registers::CANONICAL_NAMES;
use riscv_taint::{parser, snapshot};

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand(
            SubCommand::with_name("interpret")
                .about("Runs a RISC-V assembly file to completion, tracking taint")
                .arg(Arg::with_name("file").help("Assembly file to interpret").required(true).index(1))
                .arg(
                    Arg::with_name("mem-size")
                        .long("mem-size")
                        .takes_value(true)
                        .default_value("4096"),
                )
                .arg(
                    Arg::with_name("stack-size")
                        .long("stack-size")
                        .takes_value(true)
                        .default_value("128"),
                )
                .arg(
                    Arg::with_name("format")
                        .short("F")
                        .long("format")
                        .takes_value(true)
                        .possible_values(&["json", "jsonl"])
                        .default_value("json"),
                )
                .arg(
                    Arg::with_name("pickle-cabinet")
                        .long("pickle-cabinet")
                        .takes_value(true)
                        .help("Directory to write a per-step snapshot jar under"),
                ),
        )
        .subcommand(
            SubCommand::with_name("backtrack")
                .about("Loads one snapshot and drives it to completion")
                .arg(Arg::with_name("snapshot").help("Path to a snapshot file").required(true).index(1)),
        )
        .subcommand(
            SubCommand::with_name("analyze")
                .about("Summarizes taint percentage across a jar of snapshots")
                .arg(
                    Arg::with_name("pickle-jar")
                        .long("pickle-jar")
                        .takes_value(true)
                        .required(true)
                        .help("The jar directory written by `interpret` (contains pickles/)"),
                )
                .arg(Arg::with_name("register-graph").long("register-graph").help("Include the register taint series"))
                .arg(Arg::with_name("memory-graph").long("memory-graph").help("Include the memory taint series")),
        )
}

#[derive(Serialize)]
struct RegisterReport {
    name: &'static str,
    value: i64,
    taint: String,
}

#[derive(Serialize)]
struct InterpretReport {
    registers: Vec<RegisterReport>,
    snapshots_written: u64,
}

fn register_report(interp: &Interpreter) -> Result<Vec<RegisterReport>> {
    CANONICAL_NAMES
        .iter()
        .map(|&name| {
            Ok(RegisterReport {
                name,
                value: interp.state.get_reg(name)?,
                taint: interp.tracker.reg_taint(name)?.to_string(),
            })
        })
        .collect()
}

fn write_report(report: &InterpretReport) -> Result<()> {
    serde_json::to_writer_pretty(std::io::stdout(), report)?;
    println!();
    Ok(())
}

/// One step's record for `--format jsonl` (SPEC_FULL §6: "pc, opcode,
/// per-register taint summary"), modeled on mttn's `Step`-per-instruction
/// streaming output.
#[derive(Serialize)]
struct StepEvent<'a> {
    pc: i64,
    opcode: &'a str,
    registers: Vec<RegisterReport>,
}

fn interpret(matches: &ArgMatches) -> Result<()> {
    let file = matches.value_of("file").unwrap();
    let source = fs::read_to_string(file).with_context(|| format!("reading '{}'", file))?;
    let mem_size: usize = matches.value_of("mem-size").unwrap().parse().context("parsing --mem-size")?;
    let stack_size: usize = matches
        .value_of("stack-size")
        .unwrap()
        .parse()
        .context("parsing --stack-size")?;
    let format = matches.value_of("format").unwrap();
    let cabinet = matches.value_of("pickle-cabinet");
    let stream = format == "jsonl";

    let program = parser::parse(&source, default_function_table())
        .with_context(|| format!("parsing '{}'", file))?;
    let mut interp = Interpreter::new(program, mem_size, stack_size, Policy::default_policy())?;

    loop {
        if let Some(cabinet) = cabinet {
            snapshot::write_snapshot(Path::new(cabinet), file, &mut interp, "default")?;
        }

        let pc = interp.pc();
        let opcode = interp
            .program
            .instructions
            .get(pc as usize)
            .map(|instr| instr.opcode.clone());

        let outcome = interp.step()?;

        if stream {
            if let Some(opcode) = &opcode {
                let event = StepEvent { pc, opcode, registers: register_report(&interp)? };
                serde_json::to_writer(std::io::stdout(), &event)?;
                println!();
            }
        }

        if outcome == StepOutcome::Terminal {
            break;
        }
    }

    if stream {
        return Ok(());
    }

    let report = InterpretReport {
        registers: register_report(&interp)?,
        snapshots_written: interp.snapshot_counter,
    };
    write_report(&report)
}

fn backtrack(matches: &ArgMatches) -> Result<()> {
    let snapshot_path = matches.value_of("snapshot").unwrap();
    let mut interp = snapshot::load_snapshot(Path::new(snapshot_path))
        .with_context(|| format!("loading snapshot '{}'", snapshot_path))?;

    log::debug!(
        "resumed at pc={} block={} function={}",
        interp.pc(),
        interp.current_block,
        interp.current_function
    );

    interp.run()?;

    let report = InterpretReport {
        registers: register_report(&interp)?,
        snapshots_written: interp.snapshot_counter,
    };
    write_report(&report)
}

/// Loads every snapshot under `<pickle-jar>/pickles` (spec §6) and writes
/// the register/memory taint percentage series as two JSON arrays under
/// `<pickle-jar>/data/`, ported from `original_source/taint.py`'s
/// per-snapshot percentage computation.
fn analyze(matches: &ArgMatches) -> Result<()> {
    let jar = matches.value_of("pickle-jar").unwrap();
    let register_flag = matches.is_present("register-graph");
    let memory_flag = matches.is_present("memory-graph");
    let (include_registers, include_memory) = if !register_flag && !memory_flag {
        (true, true)
    } else {
        (register_flag, memory_flag)
    };

    let jar_path = Path::new(jar);
    let pickles_dir = jar_path.join("pickles");
    let slots =
        snapshot::enumerate_slots(&pickles_dir).with_context(|| format!("listing '{}'", pickles_dir.display()))?;

    let mut register_series = Vec::with_capacity(slots.len());
    let mut memory_series = Vec::with_capacity(slots.len());
    for slot in &slots {
        let interp = snapshot::load_snapshot(slot)
            .with_context(|| format!("loading snapshot '{}'", slot.display()))?;
        if include_registers {
            register_series.push(interp.tracker.percentage_tainted_registers());
        }
        if include_memory {
            memory_series.push(interp.tracker.percentage_tainted_memory());
        }
    }

    let data_dir = jar_path.join("data");
    fs::create_dir_all(&data_dir).with_context(|| format!("creating '{}'", data_dir.display()))?;

    if include_registers {
        let out_path = data_dir.join("registers_taint.json");
        let json = serde_json::to_string_pretty(&register_series)?;
        fs::write(&out_path, &json).with_context(|| format!("writing '{}'", out_path.display()))?;
        log::info!("wrote {} register data points to {}", register_series.len(), out_path.display());
    }
    if include_memory {
        let out_path = data_dir.join("memory_taint.json");
        let json = serde_json::to_string_pretty(&memory_series)?;
        fs::write(&out_path, &json).with_context(|| format!("writing '{}'", out_path.display()))?;
        log::info!("wrote {} memory data points to {}", memory_series.len(), out_path.display());
    }

    Ok(())
}

fn run() -> Result<()> {
    let matches = app().get_matches();

    match matches.subcommand() {
        ("interpret", Some(sub)) => interpret(sub),
        ("backtrack", Some(sub)) => backtrack(sub),
        ("analyze", Some(sub)) => analyze(sub),
        _ => {
            let mut out = app();
            out.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();

    process::exit(match run() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Fatal: {:#}", e);
            1
        }
    });
}
