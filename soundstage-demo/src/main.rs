mod cli;
mod loader;

use std::path::PathBuf;

const USAGE: &str = "usage: soundstage-demo [--headless] [--seconds N] [MUSIC_FILE [SFX_FILE]]";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut options = cli::DemoOptions::default();
    let mut files: Vec<PathBuf> = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => options.headless = true,
            "--seconds" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--seconds needs a value\n{}", USAGE))?;
                options.seconds = value.parse()?;
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ if arg.starts_with('-') => anyhow::bail!("unknown option {}\n{}", arg, USAGE),
            _ => files.push(PathBuf::from(arg)),
        }
    }

    let mut files = files.into_iter();
    options.music = files.next();
    options.sfx = files.next();

    cli::run(options)
}
