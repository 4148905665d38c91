// kernel/build.rs

use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use quote::{format_ident, quote};

#[allow(dead_code)]
#[path = "src/layout/plan.rs"]
mod plan;

use plan::{ImagePlan, LinkerScript};

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Parses a size given either in decimal or as `0x`-prefixed hex.
fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim().replace('_', "");
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

fn knob(name: &str, default: usize) -> Result<usize, Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed={name}");
    match env::var(name) {
        Ok(raw) => parse_size(&raw).ok_or_else(|| format!("{name}={raw} is not a valid size").into()),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(format!("{name}: {err}").into()),
    }
}

fn log_level() -> Result<String, Box<dyn Error>> {
    println!("cargo:rerun-if-env-changed=EMBER_LOG_LEVEL");
    let level = env::var("EMBER_LOG_LEVEL")
        .unwrap_or_else(|_| String::from("info"))
        .to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(format!("EMBER_LOG_LEVEL={level} is not one of {LOG_LEVELS:?}").into())
    }
}

fn resolve_plan() -> Result<ImagePlan, Box<dyn Error>> {
    let default = ImagePlan::DEFAULT;
    let plan = ImagePlan {
        memory_base: default.memory_base,
        memory_size: knob("EMBER_MEMORY_SIZE", default.memory_size)?,
        image_base: default.image_base,
        harts: knob("EMBER_HARTS", default.harts)?,
        stack_region_size: knob("EMBER_STACK_REGION", default.stack_region_size)?,
        tls_area_size: knob("EMBER_TLS_AREA", default.tls_area_size)?,
        heap_size: knob("EMBER_HEAP_SIZE", default.heap_size)?,
    };
    // An unusable layout must stop the build instead of producing an image
    // whose stacks alias or which does not fit memory.
    plan.validate()?;
    Ok(plan)
}

fn write_plan(plan: &ImagePlan, level: &str, dest: &PathBuf) -> Result<(), Box<dyn Error>> {
    let ImagePlan {
        memory_base,
        memory_size,
        image_base,
        harts,
        stack_region_size,
        tls_area_size,
        heap_size,
    } = *plan;
    let mut variant = level.to_string();
    variant[..1].make_ascii_uppercase();
    let level = format_ident!("{}", variant);

    let generated_code = quote! {
        /// Image plan resolved by `build.rs` for this build.
        pub const IMAGE_PLAN: ImagePlan = ImagePlan {
            memory_base: #memory_base,
            memory_size: #memory_size,
            image_base: #image_base,
            harts: #harts,
            stack_region_size: #stack_region_size,
            tls_area_size: #tls_area_size,
            heap_size: #heap_size,
        };

        /// Most verbose log level enabled in this build.
        pub const LOG_LEVEL: ::log::LevelFilter = ::log::LevelFilter::#level;
    };

    let generated_file = syn::parse2::<syn::File>(generated_code)?;
    fs::write(dest, prettyplease::unparse(&generated_file))?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=kernel/build.rs");
    println!("cargo:rerun-if-changed=kernel/src/layout/plan.rs");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let plan = resolve_plan()?;
    let level = log_level()?;

    write_plan(&plan, &level, &out_dir.join("image_plan.rs"))?;

    let script = out_dir.join("kernel.ld");
    fs::write(&script, LinkerScript(&plan).to_string())?;

    let arch = env::var("CARGO_CFG_TARGET_ARCH")?;
    let os = env::var("CARGO_CFG_TARGET_OS")?;
    if arch == "riscv64" && os == "none" {
        println!("cargo:rustc-link-arg-bins=-T{}", script.display());
    }

    Ok(())
}
