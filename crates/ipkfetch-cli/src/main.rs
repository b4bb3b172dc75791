use ipkfetch_lib::cli::{ResolvedCommand, parse_args, resolve_command, run_resolve, run_sync};
use ipkfetch_lib::error::IpkFetchError;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), IpkFetchError> {
    color_eyre::install()?;

    let args = parse_args();
    let command = resolve_command(args.command)?;

    match command {
        ResolvedCommand::Sync(params) => {
            run_sync(params).await?;
        }
        ResolvedCommand::Resolve(params) => run_resolve(params).await?,
    }

    Ok(())
}
