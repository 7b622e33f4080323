use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A forge with one host and no machine block, so parser defaults apply.
pub const MINIMAL_FORGE_KDL: &str = r#"
forge "test-forge" {
    admin-email "ops@test.dev"
}

provider "gcp" {
    project "test-project"
    zone "europe-west1-b"
}

ssh {
    user "forge"
}

host "ci" {
    domain "ci.test.dev"
    service {
        image "jenkins/jenkins:lts-jdk17"
        port 8080
        volume "ci-home" "/var/jenkins_home"
    }
}
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_forge_kdl(&self, content: &str) {
        let path = self.root.path().join("forge.kdl");
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// True once any command has written state under `.forgeflow/`.
    #[allow(dead_code)]
    pub fn state_dir_exists(&self) -> bool {
        self.root.path().join(".forgeflow").exists()
    }
}
