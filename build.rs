//! Build script for ensembler
//!
//! Only does work when the `mpi` feature is enabled:
//! 1. Locates the MPI installation (pkg-config, `mpicc -show`, Cray, common prefixes)
//! 2. Compiles the communicator shim (`csrc/ensembler_mpi.c`)
//! 3. Links against the MPI library

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=csrc/ensembler_mpi.c");
    println!("cargo:rerun-if-changed=csrc/ensembler_mpi.h");
    println!("cargo:rerun-if-env-changed=MPI_PKG_CONFIG");
    println!("cargo:rerun-if-env-changed=MPICC");
    println!("cargo:rerun-if-env-changed=CRAY_MPICH_DIR");

    // The local (thread-backed) process group needs no native code
    if env::var_os("CARGO_FEATURE_MPI").is_none() {
        return;
    }

    let mpi = locate_mpi();

    let mut build = cc::Build::new();
    build
        .file("csrc/ensembler_mpi.c")
        .include("csrc")
        .warnings(true)
        .extra_warnings(true);
    for path in &mpi.include_paths {
        build.include(path);
    }
    if env::var("PROFILE").unwrap_or_default() == "release" {
        build.opt_level(3);
    }
    build.compile("ensembler_mpi");

    for path in &mpi.link_paths {
        println!("cargo:rustc-link-search=native={}", path.display());
        // RPATH so the binary resolves the same libmpi at runtime
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", path.display());
    }
    for lib in &mpi.libs {
        println!("cargo:rustc-link-lib={lib}");
    }
    if let Some(version) = mpi.version {
        println!("cargo:rustc-env=ENSEMBLER_MPI_VERSION={version}");
    }
}

struct MpiInstall {
    include_paths: Vec<PathBuf>,
    link_paths: Vec<PathBuf>,
    libs: Vec<String>,
    version: Option<String>,
}

impl MpiInstall {
    fn at_prefix(prefix: &str) -> Self {
        MpiInstall {
            include_paths: vec![PathBuf::from(format!("{prefix}/include"))],
            link_paths: vec![PathBuf::from(format!("{prefix}/lib"))],
            libs: vec!["mpi".to_string()],
            version: None,
        }
    }
}

fn locate_mpi() -> MpiInstall {
    let mut pkg_names: Vec<String> = Vec::new();
    if let Ok(name) = env::var("MPI_PKG_CONFIG") {
        pkg_names.push(name);
    }
    pkg_names.extend(["mpich", "ompi", "mpi"].iter().map(|s| (*s).to_string()));

    for name in &pkg_names {
        if let Ok(install) = probe_pkg_config(name) {
            eprintln!("ensembler: MPI found via pkg-config ({name})");
            return install;
        }
    }

    match probe_mpicc() {
        Ok(install) => {
            eprintln!("ensembler: MPI found via mpicc -show");
            return install;
        }
        Err(reason) => eprintln!("ensembler: {reason}"),
    }

    if let Ok(dir) = env::var("CRAY_MPICH_DIR") {
        eprintln!("ensembler: using Cray MPICH at {dir}");
        return MpiInstall::at_prefix(&dir);
    }

    for prefix in ["/usr", "/usr/local", "/opt/mpich", "/opt/openmpi"] {
        if PathBuf::from(format!("{prefix}/include/mpi.h")).exists() {
            eprintln!("ensembler: MPI headers found under {prefix}");
            return MpiInstall::at_prefix(prefix);
        }
    }

    panic!(
        "The `mpi` feature needs an MPI installation. Install MPICH or OpenMPI and either:\n\
         - set MPI_PKG_CONFIG to its pkg-config name (e.g. 'mpich')\n\
         - put 'mpicc' on PATH (or point MPICC at it)\n\
         - set CRAY_MPICH_DIR on Cray systems"
    );
}

fn probe_pkg_config(name: &str) -> Result<MpiInstall, pkg_config::Error> {
    let lib = pkg_config::Config::new()
        .cargo_metadata(false) // linking is emitted by main()
        .probe(name)?;

    Ok(MpiInstall {
        include_paths: lib.include_paths,
        link_paths: lib.link_paths,
        libs: lib.libs,
        version: Some(lib.version),
    })
}

fn probe_mpicc() -> Result<MpiInstall, String> {
    let mpicc = env::var("MPICC").unwrap_or_else(|_| "mpicc".to_string());
    let output = Command::new(&mpicc)
        .arg("-show")
        .output()
        .map_err(|e| format!("could not run '{mpicc}': {e}"))?;
    if !output.status.success() {
        return Err(format!("'{mpicc} -show' exited with {}", output.status));
    }
    Ok(parse_compiler_flags(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_compiler_flags(flags: &str) -> MpiInstall {
    let mut install = MpiInstall {
        include_paths: Vec::new(),
        link_paths: Vec::new(),
        libs: Vec::new(),
        version: None,
    };

    for flag in flags.split_whitespace() {
        if let Some(path) = flag.strip_prefix("-I") {
            install.include_paths.push(PathBuf::from(path));
        } else if let Some(path) = flag.strip_prefix("-L") {
            install.link_paths.push(PathBuf::from(path));
        } else if let Some(lib) = flag.strip_prefix("-l") {
            install.libs.push(lib.to_string());
        }
    }

    if install.libs.is_empty() {
        install.libs.push("mpi".to_string());
    }
    install
}
