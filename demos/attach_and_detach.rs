use loopdevice::LoopDevice;
use std::{fs::File, path::Path};

fn create_backing_file(path: &str, size: u64) -> std::io::Result<()> {
    let file = File::create(path)?;
    file.set_len(size)?;

    Ok(())
}

fn main() -> loopdevice::Result<()> {
    let img_path = "/tmp/loopdevice_demo.img";

    if !Path::new(img_path).exists() {
        println!("Creating backing file at {}", img_path);

        create_backing_file(img_path, 10 * 1024 * 1024)?; // 10 MB
    }

    let device = LoopDevice::allocate()?;
    println!("Using loop device: {}", device.path().display());

    let mut device = device.attach(Path::new(img_path), true)?;
    println!("Attached {} to {}", img_path, device.path().display());

    let status = device.status()?;
    println!(
        "Status: file={} offset={} sizelimit={}",
        status.file_name(),
        status.offset(),
        status.sizelimit()
    );

    // Do something useful here (e.g., mount, read, etc.)

    device.detach()?;
    println!("Detached {}", device.path().display());

    Ok(())
}
