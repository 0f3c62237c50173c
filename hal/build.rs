use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
fn parse_usize(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    println!("cargo:rerun-if-env-changed={}", name);
    match env::var(name) {
        Ok(value) => parse_usize(&value)
            .unwrap_or_else(|| panic!("{} must be an integer, got {:?}", name, value)),
        Err(_) => default,
    }
}

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("plf_config.rs");

    // One hart per byte of an xlen word unless the platform says otherwise.
    let xlen = match env::var("CARGO_CFG_TARGET_POINTER_WIDTH").as_deref() {
        Ok("32") => 32,
        _ => 64,
    };

    let hart_num = env_usize("PLF_SMP_HART_NUM", xlen / 8);
    let hartid_base = env_usize("PLF_SMP_HARTID_BASE", 0);
    let master_hartid = env_usize("PLF_SMP_MASTER_HARTID", hartid_base);
    let trap_stack = env_usize("PLF_TRAP_STACK", 0);
    let hls_min_stack = env_usize("PLF_HLS_MIN_STACK_SIZE", 2032 + trap_stack);

    if hart_num == 0 {
        panic!("PLF_SMP_HART_NUM must be at least 1");
    }
    if master_hartid < hartid_base || master_hartid >= hartid_base + hart_num {
        panic!(
            "PLF_SMP_MASTER_HARTID ({}) outside [PLF_SMP_HARTID_BASE, PLF_SMP_HARTID_BASE + PLF_SMP_HART_NUM) = [{}, {})",
            master_hartid,
            hartid_base,
            hartid_base + hart_num
        );
    }

    let mut content = String::new();
    content.push_str("// Auto-generated platform configuration\n");
    content.push_str(&format!("pub const SMP_HART_NUM: usize = {};\n", hart_num));
    content.push_str(&format!("pub const SMP_HARTID_BASE: usize = {};\n", hartid_base));
    content.push_str(&format!("pub const SMP_MASTER_HARTID: usize = {};\n", master_hartid));
    content.push_str(&format!("pub const TRAP_STACK: usize = {};\n", trap_stack));
    content.push_str(&format!("pub const HLS_MIN_STACK_SIZE: usize = {};\n", hls_min_stack));

    let mut f = File::create(&dest_path).unwrap();
    f.write_all(content.as_bytes()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
