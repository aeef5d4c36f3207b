use clap::Parser;

#[derive(Debug, Parser)]
#[clap(about = "A compiler for C--", version)]
pub struct Options {
    /// The source file to compile
    pub source: String,
    /// Where to write the generated assembly
    pub output: String,
    /// Do not optimise the generated code
    #[clap(long)]
    no_optimise: bool,
    /// Write the intermediate representation to a file
    #[clap(long, value_name = "FILE")]
    pub dump_ir: Option<String>,
    /// Increase log verbosity
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: usize,
}

impl Options {
    pub fn optimise(&self) -> bool {
        !self.no_optimise
    }
}
