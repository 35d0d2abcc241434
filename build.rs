fn main() {
    // Generates OUT_DIR/built.rs with the git commit hash and build metadata.
    built::write_built_file().expect("Failed to acquire build-time information");
}
