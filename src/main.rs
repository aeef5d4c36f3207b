use std::fs;
use std::process;

use clap::Parser;
use log::debug;

mod codegen;
mod commandline;
mod error;
mod il;
mod lexer;
mod parser;
mod type_checking;

use commandline::Options;
use error::CompileError;

fn main() {
    let options = Options::parse();
    stderrlog::new()
        .verbosity(options.verbose + 1)
        .init()
        .expect("the logger is initialised exactly once");

    if let Err(error) = compile(&options) {
        eprintln!("{}", error);
        process::exit(error.exit_code());
    }
}

fn compile(options: &Options) -> Result<(), CompileError> {
    let source = fs::read_to_string(&options.source)
        .map_err(|e| CompileError::io(&options.source, e))?;

    let tokens = lexer::lex(&source)?;
    debug!("lexed {} tokens", tokens.len());
    let tree = parser::parse(&tokens)?;
    let mut program = type_checking::analyse(&tree)?;

    if options.optimise() {
        il::optimiser::optimise(&mut program);
    }
    if let Some(path) = &options.dump_ir {
        debug!("dumping intermediate code to {}", path);
        fs::write(path, program.render()).map_err(|e| CompileError::io(path, e))?;
    }

    let assembly = codegen::assemble(&mut program);
    fs::write(&options.output, assembly).map_err(|e| CompileError::io(&options.output, e))?;
    Ok(())
}
