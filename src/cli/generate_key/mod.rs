//! Generate-key command - offline key material for bootstrap configuration

use clap::{Args, ValueEnum};

use crate::infrastructure::api_key::{ApiKeyGenerator, GeneratedApiKey, KeyEnvironment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyEnvArg {
    Live,
    Test,
}

impl From<KeyEnvArg> for KeyEnvironment {
    fn from(arg: KeyEnvArg) -> Self {
        match arg {
            KeyEnvArg::Live => KeyEnvironment::Live,
            KeyEnvArg::Test => KeyEnvironment::Test,
        }
    }
}

#[derive(Debug, Args)]
pub struct GenerateKeyArgs {
    /// Key environment, encoded in the visible prefix
    #[arg(long, value_enum, default_value = "live")]
    pub env: KeyEnvArg,
}

/// Print a fresh key. Nothing is stored.
pub fn run(args: GenerateKeyArgs) -> anyhow::Result<()> {
    let generated = ApiKeyGenerator::new(args.env.into()).generate();
    println!("{}", render(&generated));
    Ok(())
}

fn render(generated: &GeneratedApiKey) -> String {
    format!(
        "key:    {}\nprefix: {}\nhash:   {}",
        generated.key, generated.prefix, generated.hash
    )
}
