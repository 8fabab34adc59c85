use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    doc_translate::init_tracing();
    match doc_translate::run(std::env::args().skip(1)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
