//! Remote backend for auto-deploy: shell commands over SSH with `ssh2`,
//! playbooks through a local `ansible-playbook`.

mod playbook;
mod ssh_backend;

pub use playbook::{parse_recap, PlaybookRunner};
pub use ssh_backend::SshBackend;
