//! BIOS command-line token parser. Firmware command lines are externally
//! extensible, so unknown tokens are logged and ignored rather than
//! rejected.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BootParams {
    pub debug: bool,
    pub iso_efi: bool,
    pub memdisk: bool,
    pub first_try: Option<String>,
    pub mem_addr: Option<u64>,
    pub size: Option<u64>,
}

/// Parses the space-separated token list from the handoff page or the
/// `env_param=<hex-ptr>`-resolved kernel cmdline. Recognised tokens:
/// `debug`, `isoefi=on`, `memdisk`, `FirstTry=<path>`, `mem:<hex-addr>`,
/// `size:<decimal>`.
pub fn parse(cmdline: &str) -> BootParams {
    let mut params = BootParams::default();
    for token in cmdline.split_whitespace() {
        match token {
            "debug" => params.debug = true,
            "isoefi=on" => params.iso_efi = true,
            "memdisk" => params.memdisk = true,
            t if t.starts_with("FirstTry=") => {
                params.first_try = Some(t["FirstTry=".len()..].to_string());
            }
            t if t.starts_with("mem:") => match u64::from_str_radix(&t[4..], 16) {
                Ok(addr) => params.mem_addr = Some(addr),
                Err(_) => log::warn!("ignoring malformed mem: token: {}", t),
            },
            t if t.starts_with("size:") => match t[5..].parse::<u64>() {
                Ok(size) => params.size = Some(size),
                Err(_) => log::warn!("ignoring malformed size: token: {}", t),
            },
            other => log::warn!("ignoring unrecognised boot cmdline token: {}", other),
        }
    }
    params
}
