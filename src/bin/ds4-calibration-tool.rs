//! Interactive DualShock 4 stick and trigger calibration.

use dstool::command::{Ds4Calibration, DS4_CALIBRATION_MENU};
use dstool::operator::TerminalOperator;
use dstool::{discovery, Config, Device, DeviceFamily, DsError};

fn fail(e: DsError) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("DualShock 4 Calibration Tool");
    println!("This tool may break your controller. Use at your own risk.");

    let config = Config::from_env();
    let channel = discovery::connect(DeviceFamily::Ds4, &config).unwrap_or_else(|e| fail(e));
    let device = Device::new(channel, DeviceFamily::Ds4);
    println!("DualShock 4 online!");

    let mut operator = TerminalOperator::stdio();
    println!();
    println!("{}", DS4_CALIBRATION_MENU);
    let choice = operator.prompt_line("> ").unwrap_or_else(|e| fail(e));
    let Some(calibration) = Ds4Calibration::from_menu_choice(&choice) else {
        println!("Invalid choice.");
        return;
    };

    let debug_log = calibration
        .run(&device, &mut operator)
        .unwrap_or_else(|e| fail(e));
    println!("Calibration done!!");

    let Some(chunks) = debug_log else {
        return;
    };
    println!();
    println!("Here is some debug data from the DS4 about the calibration");
    for (i, chunk) in chunks.iter().enumerate() {
        println!("Sample {}, data={}", i, hex::encode(chunk));
    }
}
