fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // libFuzzer's sanitizer runtime is only wired up for Linux targets.
    #[cfg(target_os = "linux")]
    println!("cargo:rustc-cfg=fuzzing");

    #[cfg(not(target_os = "linux"))]
    println!("cargo:warning=appvalidator fuzz targets are only supported on Linux; use a container elsewhere");
}
