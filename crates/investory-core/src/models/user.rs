use serde::{Deserialize, Serialize};

/// Identity attributes returned by the authority on sign-in and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub login_id: String,
    pub email: String,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    /// Investor-profile tag, present once the user has completed the WMTI survey.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmti_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Partial profile. Fields left as `None` are not touched by [`UserProfile::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmti_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserProfile {
    /// Merge the present fields of `update` into this profile.
    pub fn merge(&mut self, update: UserProfileUpdate) {
        if let Some(login_id) = update.login_id {
            self.login_id = login_id;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(nickname) = update.nickname {
            self.nickname = nickname;
        }
        if update.gender.is_some() {
            self.gender = update.gender;
        }
        if update.birth_year.is_some() {
            self.birth_year = update.birth_year;
        }
        if update.wmti_type.is_some() {
            self.wmti_type = update.wmti_type;
        }
        if update.phone.is_some() {
            self.phone = update.phone;
        }
        if update.profile_image.is_some() {
            self.profile_image = update.profile_image;
        }
        if update.level.is_some() {
            self.level = update.level;
        }
        if update.experience.is_some() {
            self.experience = update.experience;
        }
        if update.role.is_some() {
            self.role = update.role;
        }
    }

    /// Name to show in prompts and status lines
    pub fn display_name(&self) -> &str {
        if self.nickname.is_empty() {
            &self.login_id
        } else {
            &self.nickname
        }
    }
}

impl From<UserProfile> for UserProfileUpdate {
    fn from(profile: UserProfile) -> Self {
        Self {
            login_id: Some(profile.login_id),
            email: Some(profile.email),
            nickname: Some(profile.nickname),
            gender: profile.gender,
            birth_year: profile.birth_year,
            wmti_type: profile.wmti_type,
            phone: profile.phone,
            profile_image: profile.profile_image,
            level: profile.level,
            experience: profile.experience,
            role: profile.role,
        }
    }
}
