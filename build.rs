use std::{env, fs, path::Path};

/// Copies the hub's `config.json` next to the built executable so that
/// `cargo run` finds it without a `--config` flag.
fn main() {
    println!("cargo:rerun-if-changed=config.json");

    // OUT_DIR = target/<profile>/build/<crate>/out
    let Ok(out_dir) = env::var("OUT_DIR") else {
        println!("cargo:warning=OUT_DIR not set, skipping hub config copy");
        return;
    };

    // target/<profile> is three levels up
    let Some(exe_dir) = Path::new(&out_dir).ancestors().nth(3) else {
        println!("cargo:warning=Cannot locate executable directory");
        return;
    };

    let src = Path::new("config.json");
    if !src.exists() {
        return;
    }

    let dst = exe_dir.join("config.json");
    if let Err(e) = fs::copy(src, &dst) {
        println!("cargo:warning=Could not copy hub config to {}: {}", dst.display(), e);
    }
}
