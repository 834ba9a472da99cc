//! Integration tests for tarmac

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn tarmac() -> Command {
        let mut cmd = cargo_bin_cmd!("tarmac");
        for var in [
            "TARMAC_CONFIG",
            "TARMAC_CACHE_KEY",
            "TARMAC_CACHE_FOLDER",
            "TARMAC_REMOTE_URL",
            "TARMAC_BUCKET",
            "TARMAC_REMOTE_TOKEN",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    /// A yarn-workspaces root whose installer is a shell one-liner
    fn workspace(install: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "private": true, "workspaces": ["packages/*"] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("yarn.lock"), "left-pad@^1.3.0:\n  version \"1.3.0\"\n").unwrap();
        write_config(dir.path(), install, "");
        dir
    }

    fn write_config(root: &Path, install: &str, extra: &str) {
        let config = format!(
            "[commands]\ninstall = [\"sh\", \"-c\", {:?}]\n{}",
            install, extra
        );
        fs::write(root.join("tarmac.toml"), config).unwrap();
    }

    fn git(root: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(root)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    /// Build script that writes `dist/index.js` for every `--scope` and
    /// logs each package it builds
    const BUILD_SCRIPT: &str = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--scope" ]; then
    mkdir -p "packages/$2/dist"
    echo "built $2" > "packages/$2/dist/index.js"
    echo "$2" >> build.log
    shift
  fi
  shift
done
"#;

    /// A git repository with one package `a` that has a build script
    fn buildable_workspace() -> TempDir {
        let dir = workspace("true");
        let root = dir.path();

        let pkg = root.join("packages/a");
        fs::create_dir_all(pkg.join("src")).unwrap();
        fs::write(
            pkg.join("package.json"),
            r#"{ "name": "a", "version": "1.0.0", "scripts": { "build": "tsc" } }"#,
        )
        .unwrap();
        fs::write(pkg.join("src/index.ts"), "export const a = 1;\n").unwrap();

        fs::write(
            root.join("listing.json"),
            r#"[{ "name": "a", "version": "1.0.0", "location": "packages/a" }]"#,
        )
        .unwrap();
        fs::write(root.join("build.sh"), BUILD_SCRIPT).unwrap();
        write_config(
            root,
            "true",
            "list = [\"cat\", \"listing.json\"]\nbuild = [\"sh\", \"build.sh\"]\n",
        );

        git(root, &["init", "-q"]);
        git(root, &["add", "package.json", "yarn.lock", "packages"]);
        dir
    }

    const INSTALL_LEFT_PAD: &str =
        "mkdir -p node_modules/left-pad && echo pad > node_modules/left-pad/index.js";

    #[test]
    fn help_displays() {
        tarmac()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache"));
    }

    #[test]
    fn version_displays() {
        tarmac()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("tarmac"));
    }

    #[test]
    fn build_help_lists_skip_install() {
        tarmac()
            .args(["build", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--skip-install"));
    }

    #[test]
    fn outside_workspace_fails() {
        let dir = TempDir::new().unwrap();
        tarmac()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Could not find workspace root"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = workspace("true");
        fs::write(dir.path().join("tarmac.toml"), "[cache\nkey =").unwrap();
        tarmac()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn install_populates_then_restores() {
        let dir = workspace(INSTALL_LEFT_PAD);

        tarmac()
            .current_dir(dir.path())
            .args(["--no-color", "install"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dependency cache miss"))
            .stdout(predicate::str::contains("Dependency cache stored"));

        fs::remove_dir_all(dir.path().join("node_modules")).unwrap();
        // The installer now only checks that dependencies are in place
        write_config(dir.path(), "test -f node_modules/left-pad/index.js", "");

        tarmac()
            .current_dir(dir.path())
            .args(["--no-color", "install"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dependencies restored (local)"));
    }

    #[test]
    fn install_restores_from_directory_remote() {
        let shared = TempDir::new().unwrap();
        let remote = format!("file://{}", shared.path().display());

        let first = workspace(INSTALL_LEFT_PAD);
        tarmac()
            .current_dir(first.path())
            .args(["--no-color", "install"])
            .env("TARMAC_REMOTE_URL", &remote)
            .assert()
            .success();

        let second = workspace("test -f node_modules/left-pad/index.js");
        tarmac()
            .current_dir(second.path())
            .args(["--no-color", "install"])
            .env("TARMAC_REMOTE_URL", &remote)
            .assert()
            .success()
            .stdout(predicate::str::contains("Dependencies restored (remote)"));
    }

    #[test]
    fn cache_key_override_changes_entry() {
        let dir = workspace(INSTALL_LEFT_PAD);
        tarmac()
            .current_dir(dir.path())
            .args(["--no-color", "install"])
            .assert()
            .success();

        tarmac()
            .current_dir(dir.path())
            .args(["--no-color", "--cache-key", "v2", "install"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dependency cache miss"))
            .stdout(predicate::str::contains("-v2"));
    }

    #[test]
    fn failing_installer_exits_nonzero() {
        let dir = workspace("exit 4");
        tarmac()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Dependency install failed"))
            .stderr(predicate::str::contains("code 4"));
        assert!(!dir.path().join(".tarmac").exists());
    }

    #[test]
    fn missing_lockfile_exits_nonzero() {
        let dir = workspace("true");
        fs::remove_file(dir.path().join("yarn.lock")).unwrap();
        tarmac()
            .current_dir(dir.path())
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("yarn.lock"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_misses_then_restores_locally() {
        let dir = buildable_workspace();
        let root = dir.path();

        tarmac()
            .current_dir(root)
            .args(["--no-color", "build", "--skip-install"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache miss a-"))
            .stdout(predicate::str::contains("Build finished"))
            .stdout(predicate::str::contains("0 cached (0 local, 0 remote), 1 built"));

        let stored: Vec<String> = fs::read_dir(root.join(".tarmac"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].starts_with("a-") && stored[0].ends_with(".tar"));

        fs::remove_dir_all(root.join("packages/a/dist")).unwrap();

        tarmac()
            .current_dir(root)
            .args(["--no-color", "build", "--skip-install"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache hit (local) a-"))
            .stdout(predicate::str::contains("1 cached (1 local, 0 remote), 0 built"));

        assert_eq!(
            fs::read_to_string(root.join("packages/a/dist/index.js")).unwrap(),
            "built a\n"
        );
        assert_eq!(fs::read_to_string(root.join("build.log")).unwrap(), "a\n");

        let key = stored[0].trim_end_matches(".tar").to_string();
        tarmac()
            .current_dir(root)
            .args(["status", "-f", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::diff(format!("{}\n", key)));

        tarmac()
            .current_dir(root)
            .args(["status", "-f", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"local\": true"));
    }

    #[test]
    fn build_key_follows_tracked_sources() {
        let dir = buildable_workspace();
        let root = dir.path();

        let key_of = || {
            let output = tarmac()
                .current_dir(root)
                .args(["status", "-f", "plain"])
                .output()
                .unwrap();
            assert!(output.status.success());
            String::from_utf8(output.stdout).unwrap()
        };

        let before = key_of();
        // Untracked output does not move the key
        fs::create_dir_all(root.join("packages/a/dist")).unwrap();
        fs::write(root.join("packages/a/dist/index.js"), "stale").unwrap();
        assert_eq!(key_of(), before);

        fs::write(root.join("packages/a/src/index.ts"), "export const a = 2;\n").unwrap();
        assert_ne!(key_of(), before);
    }

    #[test]
    fn unsupported_remote_scheme_fails() {
        let dir = workspace("true");
        tarmac()
            .current_dir(dir.path())
            .args(["--remote-url", "ftp://cache.example.com", "install"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported remote.url scheme"));
    }
}
