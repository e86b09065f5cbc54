use clap::Parser;
use log::debug;
use sourceq::cli::{self, Args};
use sourceq::network::UdpBackend;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    debug!("{:?}", args);

    let backend = Arc::new(UdpBackend::new(args.master.clone()));
    let mut out = io::BufWriter::new(io::stdout());
    let mut diag = io::stderr();

    let result = cli::run(&args, backend, &mut out, &mut diag).await;
    let flushed = out.flush();

    match result.and(flushed.map_err(Into::into)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sourceq: {}", e);
            ExitCode::FAILURE
        }
    }
}
