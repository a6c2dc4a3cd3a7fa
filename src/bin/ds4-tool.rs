//! Read and write DualShock 4 factory data.

use clap::CommandFactory;
use dstool::command::{self, Ds4ToolCli};
use dstool::{discovery, Config, Device, DeviceFamily, DsError};

fn fail(e: DsError) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = command::parse_cli::<Ds4ToolCli>();
    let Some(command) = cli.action else {
        let _ = Ds4ToolCli::command().print_help();
        std::process::exit(1);
    };
    let action = command.validate().unwrap_or_else(|e| fail(e));

    let config = Config::from_env();
    let channel = discovery::connect(DeviceFamily::Ds4, &config).unwrap_or_else(|e| fail(e));
    let mut device = Device::new(channel, DeviceFamily::Ds4);

    if let Err(e) = command::run_ds4_action(&mut device, action, || {
        discovery::connect(DeviceFamily::Ds4, &config)
    }) {
        fail(e);
    }
}
