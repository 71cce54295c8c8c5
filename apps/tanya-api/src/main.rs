use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = tanya_api::Args::parse();
	tanya_api::run(args).await
}
