use std::fs;
use std::path::Path;

const DEFAULTS: &[(&str, &str)] = &[
    ("FW_MODEL", "esp8266-power"),
    ("FW_VERSION", "v1.0.0"),
    ("FW_MANIFEST_URL", "https://yvsimm01.github.io/esp8266_OAT/manifest.json"),
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
];

fn main() -> anyhow::Result<()> {
    // Necessary for ESP-IDF
    embuild::espidf::sysenv::output();

    // Build-time identity and credentials come from ota_config.h if it exists
    let config_path = "ota_config.h";
    println!("cargo:rerun-if-changed={}", config_path);
    let contents = if Path::new(config_path).exists() {
        fs::read_to_string(config_path)?
    } else {
        println!("cargo:warning=ota_config.h not found! Copy ota_config.h.example to ota_config.h and add your settings.");
        String::new()
    };

    for (name, default) in DEFAULTS {
        let define = format!("#define {}", name);
        let value = contents
            .lines()
            .find(|l| l.trim_start().starts_with(&define))
            .and_then(|l| l.split('"').nth(1))
            .unwrap_or(default);
        println!("cargo:rustc-env={}={}", name, value);
    }

    Ok(())
}
