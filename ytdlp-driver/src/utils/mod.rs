//! Small helpers shared by the fetchers and the executor.

pub mod file_system;
pub mod platform;

/// Converts a list of borrowed strings into owned ones.
pub fn to_owned(args: Vec<impl AsRef<str>>) -> Vec<String> {
    args.into_iter().map(|arg| arg.as_ref().to_string()).collect()
}

/// Returns the executable file name for the current platform.
pub fn find_executable(name: impl AsRef<str>) -> String {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "windows")] {
            format!("{}.exe", name.as_ref())
        } else {
            name.as_ref().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_name_matches_platform() {
        let name = find_executable("ffmpeg");
        if cfg!(target_os = "windows") {
            assert_eq!(name, "ffmpeg.exe");
        } else {
            assert_eq!(name, "ffmpeg");
        }
    }
}
