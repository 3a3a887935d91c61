#[macro_use]
extern crate clap;

use clap::{Arg, SubCommand};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use rv32im::simulator::RunResult;
use rv32im::ExitCode;
use rv32im_asm::Program;
use rv32im_obj::LinkedProgram;

#[derive(Debug)]
enum Error {
    Io(std::io::Error, PathBuf),
    Assemble(String, Vec<rv32im_asm::AssembleError>),
    Link(rv32im_obj::LinkError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, path) => write!(f, "\"{}\": {}", path.display(), err),
            Error::Assemble(unit, errors) => {
                for err in errors {
                    writeln!(f, "{}: {}", unit, err)?;
                }
                Ok(())
            }
            Error::Link(err) => write!(f, "link error: {}", err),
        }
    }
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("asm")
                .about("Assembles and links sources into a single linked object file")
                .arg(
                    Arg::with_name("INPUT")
                        .help("Source files to assemble, in link order")
                        .required(true)
                        .multiple(true),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("OUTPUT")
                        .help("Sets the output file to write to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Assembles (or loads a linked object) and simulates it to completion")
                .arg(
                    Arg::with_name("INPUT")
                        .help("Source files or a single linked object file")
                        .required(true)
                        .multiple(true),
                )
                .arg(
                    Arg::with_name("breakpoint")
                        .short("b")
                        .long("break")
                        .takes_value(true)
                        .multiple(true)
                        .number_of_values(1)
                        .value_name("ADDRESS")
                        .help("Stops before executing the instruction at this address (hex, e.g. 0x100)"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("asm", Some(sub)) => asm(sub),
        ("run", Some(sub)) => run(sub),
        _ => {
            eprintln!("expected a subcommand: 'asm' or 'run' (try --help)");
            process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn read_unit(path: &Path) -> Result<(String, Program), Error> {
    let mut source = String::new();
    File::open(path)
        .and_then(|f| BufReader::new(f).read_to_string(&mut source))
        .map_err(|err| Error::Io(err, path.to_owned()))?;

    let name = path.display().to_string();
    let program = rv32im_asm::assemble(&source).map_err(|errs| Error::Assemble(name.clone(), errs))?;
    Ok((name, program))
}

fn assemble_and_link(paths: &[&str]) -> Result<LinkedProgram, Error> {
    let units = paths
        .iter()
        .map(|p| read_unit(Path::new(p)))
        .collect::<Result<Vec<_>, _>>()?;
    rv32im_obj::linker::link(&units).map_err(Error::Link)
}

fn asm(matches: &clap::ArgMatches) -> Result<(), Error> {
    let inputs: Vec<&str> = matches.values_of("INPUT").unwrap().collect();
    let linked = assemble_and_link(&inputs)?;

    let output: PathBuf = matches
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(inputs[0]).with_extension("rvo"));

    rv32im_obj::write_file(&output, &linked).map_err(|err| Error::Io(err, output.clone()))?;
    Ok(())
}

fn run(matches: &clap::ArgMatches) -> Result<(), Error> {
    let inputs: Vec<&str> = matches.values_of("INPUT").unwrap().collect();

    let linked = if inputs.len() == 1 && inputs[0].ends_with(".rvo") {
        let path = Path::new(inputs[0]);
        rv32im_obj::read_file(path).map_err(|err| Error::Io(err, path.to_owned()))?
    } else {
        assemble_and_link(&inputs)?
    };

    let debug_info = linked.debug_info.clone();
    let mut state = linked.into_simulator();

    if let Some(addresses) = matches.values_of("breakpoint") {
        for addr in addresses {
            let parsed = u32::from_str_radix(addr.trim_start_matches("0x"), 16).unwrap_or(0);
            state.breakpoints_mut().insert(parsed);
        }
    }

    loop {
        match state.run() {
            Ok(RunResult::Stopped(code)) => {
                match code {
                    ExitCode::Exited(status) => process::exit(status),
                    ExitCode::OutOfText => {
                        eprintln!("program counter left the text segment");
                        process::exit(1);
                    }
                    ExitCode::InvalidOpcode => {
                        eprintln!("invalid instruction at pc {:#010x}", state.pc());
                        process::exit(1);
                    }
                }
            }
            Ok(RunResult::Breakpoint) => {
                println!("breakpoint hit at pc {:#010x}", state.pc());
                break;
            }
            Err(err) => {
                eprintln!("{}", err);
                let index = (state.pc() / rv32im::INSTRUCTION_BYTES) as usize;
                if let Some((unit, line, source)) = debug_info.get(index) {
                    eprintln!("  at {}:{}: {}", unit, line, source);
                }
                process::exit(1);
            }
        }
    }

    Ok(())
}
