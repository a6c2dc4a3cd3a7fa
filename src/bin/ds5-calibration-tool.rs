//! DualSense stick calibration.

use clap::CommandFactory;
use dstool::command::{self, Ds5ToolCli};
use dstool::operator::TerminalOperator;
use dstool::{discovery, Config, Device, DeviceFamily, DsError};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("DualSense Calibration Tool");
    println!("This tool may break your controller. Use at your own risk.");

    let cli = command::parse_cli::<Ds5ToolCli>();
    let Some(action) = cli.action else {
        let _ = Ds5ToolCli::command().print_help();
        std::process::exit(1);
    };

    let config = Config::from_env();
    let channel = match discovery::connect(DeviceFamily::Ds5, &config) {
        Ok(channel) => channel,
        Err(DsError::DeviceNotFound) => {
            eprintln!("Cannot find a DualSense");
            std::process::exit(-1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let mut device = Device::new(channel, DeviceFamily::Ds5);
    println!("== DualSense online! ==");

    let mut operator = TerminalOperator::stdio();
    match command::run_ds5_command(&mut device, action, cli.permanent, &mut operator) {
        Ok(()) => println!("Stick calibration done!!"),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
