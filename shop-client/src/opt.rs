use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "shop-client", about = "Shop catalog, cart and account shell")]
pub struct Opt {
    /// Config file path
    #[arg(short, long, value_parser, default_value = "config.toml")]
    pub config: clio::Input,
}
