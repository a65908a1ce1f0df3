// Stamps the binary with its build time for `--version`

fn main() {
    let built = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", built);
}
