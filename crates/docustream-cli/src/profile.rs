use docustream_core::DocumentRoot;
use serde::{Deserialize, Serialize};

use crate::cli::SetArgs;

/// Root record of the sample store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub age: i32,
    pub favorite_color: String,
    #[serde(with = "docustream_core::adapters::base64_bytes_opt")]
    pub avatar: Option<Vec<u8>>,
}

impl DocumentRoot for Profile {
    const TAG: &'static str = "Profile";
}

impl Profile {
    /// Apply the fields present in `args`. `avatar` is the already-read file.
    pub fn apply(&mut self, args: &SetArgs, avatar: Option<Vec<u8>>) {
        if let Some(name) = &args.name {
            self.name = name.clone();
        }
        if let Some(age) = args.age {
            self.age = age;
        }
        if let Some(color) = &args.color {
            self.favorite_color = color.clone();
        }
        if avatar.is_some() {
            self.avatar = avatar;
        }
    }

    pub fn render(&self) -> String {
        let avatar = match &self.avatar {
            Some(bytes) => format!("{} bytes", bytes.len()),
            None => "none".to_string(),
        };
        format!(
            "name:  {}\nage:   {}\ncolor: {}\navatar: {}",
            self.name, self.age, self.favorite_color, avatar
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn apply_only_touches_given_fields() {
        let mut profile = Profile {
            name: "bob".into(),
            age: 30,
            favorite_color: "green".into(),
            avatar: Some(vec![1, 2, 3]),
        };
        let args = SetArgs {
            age: Some(31),
            ..SetArgs::default()
        };
        profile.apply(&args, None);

        assert_eq!(
            profile,
            Profile {
                name: "bob".into(),
                age: 31,
                favorite_color: "green".into(),
                avatar: Some(vec![1, 2, 3]),
            }
        );
    }

    #[test]
    fn render_summarizes_avatar() {
        let profile = Profile {
            name: "alice".into(),
            avatar: Some(vec![0; 512]),
            ..Profile::default()
        };
        let text = profile.render();
        assert!(text.contains("alice"));
        assert!(text.contains("512 bytes"));
    }
}
