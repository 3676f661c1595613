use std::{fs, io, process::ExitCode};

use eyre::{bail, Context};
use nickel::{
    eval::Evaluator,
    parser::{parse_program, Parser},
};
use tracing::debug;

fn fallible_main() -> eyre::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        bail!("usage: nickel PATH");
    };

    let source = fs::read_to_string(&path)
        .with_context(|| format!("cannot read program from {path}"))?;

    let mut parser = Parser::new(&source);
    let program = parse_program(&mut parser)?;
    debug!(%path, "parsed program");

    let mut evaluator = Evaluator::new(io::stdout().lock());
    evaluator.run(&program)?;

    Ok(())
}

fn main() -> ExitCode {
    color_eyre::install().unwrap();
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    match fallible_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Diagnostics go to stdout, the interpreter's only output channel.
            println!("Nickel: error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
