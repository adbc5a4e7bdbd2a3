use std::fs;

fn main() {
    // Read VERSION file
    let version_file = fs::read_to_string("VERSION")
        .expect("VERSION file not found - run: echo '0.3.0' > VERSION");

    let version = version_file.trim();
    let cargo_version = env!("CARGO_PKG_VERSION");

    if version != cargo_version {
        panic!(
            "\n\nVERSION MISMATCH!\n\
            VERSION file: {}\n\
            Cargo.toml:   {}\n\n\
            Bump both to the same release before building.\n\n",
            version, cargo_version
        );
    }

    println!("cargo:rerun-if-changed=VERSION");
}
