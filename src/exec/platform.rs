// src/exec/platform.rs

//! OS family detection, used only to choose the shell-wrap invocation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub is_unix: bool,
    pub is_windows: bool,
}

impl Platform {
    pub const UNIX: Platform = Platform {
        is_unix: true,
        is_windows: false,
    };

    pub const WINDOWS: Platform = Platform {
        is_unix: false,
        is_windows: true,
    };

    pub fn current() -> Self {
        Self {
            is_unix: cfg!(unix),
            is_windows: cfg!(windows),
        }
    }

    /// Replace `args` with a shell invocation running them as one line.
    ///
    /// Returns `None` on a platform that is neither Unix nor Windows.
    pub fn shell_wrap(&self, args: Vec<String>) -> Option<Vec<String>> {
        let line = args.join(" ");
        if self.is_unix {
            Some(vec!["/bin/sh".to_string(), "-c".to_string(), line])
        } else if self.is_windows {
            Some(vec!["CMD.exe".to_string(), "/C".to_string(), line])
        } else {
            None
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unix_wraps_in_bin_sh() {
        let wrapped = Platform::UNIX.shell_wrap(args(&["echo", "a", "&&", "echo", "b"]));
        assert_eq!(wrapped, Some(args(&["/bin/sh", "-c", "echo a && echo b"])));
    }

    #[test]
    fn windows_wraps_in_cmd() {
        let wrapped = Platform::WINDOWS.shell_wrap(args(&["dir", "/b"]));
        assert_eq!(wrapped, Some(args(&["CMD.exe", "/C", "dir /b"])));
    }

    #[test]
    fn unknown_platform_declines() {
        let p = Platform {
            is_unix: false,
            is_windows: false,
        };
        assert_eq!(p.shell_wrap(args(&["ls"])), None);
    }
}
