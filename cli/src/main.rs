use clap::Parser;
use glagol_cli::Args;
use glagol_tracing::TracingBuilder;

fn main() {
    let args = Args::parse();

    if let Err(err) = TracingBuilder::default().level(args.log_level).build() {
        eprintln!("failed to set up logging: {}", err);
    }

    if !glagol_cli::run(&args).finalize() {
        std::process::exit(1);
    }
}
