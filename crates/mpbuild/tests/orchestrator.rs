mod common;

use std::cell::RefCell;
use std::path::PathBuf;

use mpbuild::build::{BuildRequest, Builder, VariantSpec, firmware_path};
use mpbuild::catalog::{Catalog, Variant};
use mpbuild::command::{
    BuildMode, HostEnv, HostPlatform, IdentityPaths, Invocation, SynthesisRequest, synthesize,
};
use mpbuild::container::ContainerOptions;
use mpbuild::executor::{CommandRunner, ProcessOutput};
use mpbuild::{Error, Result};

/// Records every invocation and answers with a fixed output. When `produce`
/// is set, the file is created as a real build would.
#[derive(Default)]
struct FakeRunner {
    output: ProcessOutput,
    produce: Option<PathBuf>,
    calls: RefCell<Vec<Invocation>>,
}

impl FakeRunner {
    fn exiting(code: i32) -> Self {
        Self {
            output: ProcessOutput {
                code: Some(code),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, inv: &Invocation) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(inv.clone());
        if let Some(p) = &self.produce {
            common::touch(p);
        }
        Ok(self.output.clone())
    }
}

fn host() -> HostEnv {
    HostEnv {
        uid: 501,
        gid: 20,
        home: "/home/dev".into(),
        nprocs: 8,
        engine: "docker".into(),
        platform: HostPlatform::Posix,
    }
}

#[test]
fn unknown_board_fails_before_running_anything() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner::exiting(0);
    let builder = Builder::new(&cat, &runner, host());

    let err = builder
        .build(&BuildRequest::new("DOES_NOT_EXIST", None, BuildMode::Build))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownBoard { ref board } if board == "DOES_NOT_EXIST"));

    let err = builder
        .build(&BuildRequest::new("PYBV11", Some("NOPE".into()), BuildMode::Build))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { .. }), "unexpected: {err}");
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn zero_exit_without_firmware_is_missing_artifact() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner::exiting(0);
    let builder = Builder::new(&cat, &runner, host());

    match builder.build(&BuildRequest::new("PYBV11", None, BuildMode::Build)) {
        Err(Error::MissingArtifact { path, .. }) => {
            assert_eq!(path, tmp.path().join("ports/stm32/build-PYBV11/firmware.dfu"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[test]
fn successful_build_reports_firmware_and_deploy_doc() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let expected = tmp.path().join("ports/stm32/build-PYBV11-THREAD/firmware.dfu");
    let runner = FakeRunner {
        produce: Some(expected.clone()),
        ..FakeRunner::exiting(0)
    };
    let builder = Builder::new(&cat, &runner, host());

    let outcome = builder.build_by_variant_str("PYBV11-THREAD", BuildMode::Build).unwrap();
    let fw = outcome.firmware.unwrap();
    assert_eq!(fw.path, expected);
    assert_eq!(fw.board, "PYBV11");
    assert_eq!(fw.variant, "THREAD");
    assert_eq!(
        outcome.deploy_doc,
        Some(tmp.path().join("ports/stm32/boards/PYBV10/deploy.md"))
    );
    assert!(outcome.invocation.args.contains(&"501:20".to_string()));
    assert!(
        outcome
            .invocation
            .args
            .contains(&"micropython/build-micropython-arm".to_string())
    );
}

#[test]
fn failed_build_carries_streams_verbatim() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let stdout = "CC main.c\n".repeat(5_000);
    let runner = FakeRunner {
        output: ProcessOutput {
            code: Some(2),
            stdout: stdout.clone(),
            stderr: "\u{1b}[01;31merror\u{1b}[m: boom\n".into(),
        },
        ..Default::default()
    };
    let builder = Builder::new(&cat, &runner, host());

    match builder.build(&BuildRequest::new("X", Some("DP".into()), BuildMode::Build)) {
        Err(Error::BuildFailed {
            board,
            variant,
            code,
            stdout: out,
            stderr,
        }) => {
            assert_eq!((board.as_str(), variant.as_str(), code), ("X", "DP", Some(2)));
            assert_eq!(out, stdout);
            assert_eq!(stderr, "\u{1b}[01;31merror\u{1b}[m: boom\n");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn synthetic_board_firmware_paths() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();

    let default = cat.variant("unix", None).unwrap();
    assert_eq!(
        firmware_path(&cat, default).unwrap(),
        tmp.path().join("ports/unix/build-standard/micropython")
    );
    let coverage = cat.variant("unix", Some("coverage")).unwrap();
    assert_eq!(
        firmware_path(&cat, coverage).unwrap(),
        tmp.path().join("ports/unix/build-coverage/micropython")
    );
    let esp = cat.variant("ESP32_GENERIC", None).unwrap();
    assert_eq!(
        firmware_path(&cat, esp).unwrap(),
        tmp.path().join("ports/esp32/build-ESP32_GENERIC/micropython.bin")
    );
}

#[test]
fn port_without_toolchain_is_unsupported() {
    let tmp = common::micropython_tree();
    common::add_special_port(tmp.path(), "windows", &["dev"]);
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner::exiting(0);
    let builder = Builder::new(&cat, &runner, host());

    let err = builder
        .build(&BuildRequest::new("windows", None, BuildMode::Build))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedPort { ref port } if port == "windows"));
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn clean_has_no_firmware_and_runs_as_root() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner::exiting(0);
    let builder = Builder::new(&cat, &runner, host());

    let outcome = builder
        .build(&BuildRequest::new("PYBV11", None, BuildMode::Clean))
        .unwrap();
    assert!(outcome.firmware.is_none());
    assert!(outcome.deploy_doc.is_none());
    assert!(outcome.invocation.args.contains(&"0:0".to_string()));
}

#[test]
fn esp32_image_carries_idf_tag_and_version_is_validated() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner::exiting(0);
    let builder = Builder::new(&cat, &runner, host());

    let mut req = BuildRequest::new("ESP32_GENERIC", None, BuildMode::Clean);
    req.container.toolchain_version = Some("v5.4.1".into());
    let (_, inv) = builder.plan(&req).unwrap();
    assert!(inv.args.contains(&"espressif/idf:v5.4.1".to_string()));

    let mut req = BuildRequest::new("PYBV11", None, BuildMode::Clean);
    req.container.toolchain_version = Some("v5.4.1".into());
    let err = builder.plan(&req).unwrap_err();
    assert!(matches!(err, Error::VersionNotApplicable { .. }), "unexpected: {err}");
}

#[test]
fn batch_results_are_independent() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let runner = FakeRunner {
        produce: Some(tmp.path().join("ports/stm32/build-PYBV10/firmware.dfu")),
        ..FakeRunner::exiting(0)
    };
    let builder = Builder::new(&cat, &runner, host());

    let specs = ["PYBV10", "NOPE", "X-DP"].map(VariantSpec::parse);
    let results = builder.build_many(&specs, BuildMode::Build, &ContainerOptions::default());

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(Error::UnknownBoard { .. })));
    assert!(matches!(results[2].1, Err(Error::MissingArtifact { .. })));
    assert_eq!(results[2].0.to_string(), "X-DP");
    assert_eq!(runner.calls.borrow().len(), 2);
}

#[test]
fn variant_from_another_catalog_is_rejected() {
    let tmp = common::micropython_tree();
    let cat = Catalog::load(tmp.path()).unwrap();
    let stray = Variant {
        name: String::new(),
        text: String::new(),
        board: "RPI_PICO".into(),
    };

    let err = firmware_path(&cat, &stray).unwrap_err();
    assert!(matches!(err, Error::UnknownBoard { ref board } if board == "RPI_PICO"));

    let err = synthesize(
        &SynthesisRequest {
            catalog: &cat,
            variant: &stray,
            mode: BuildMode::Build,
            image: "micropython/build-micropython-rp2",
            extra_args: &[],
            interactive: false,
        },
        &host(),
        &IdentityPaths,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownBoard { .. }), "unexpected: {err}");
}
