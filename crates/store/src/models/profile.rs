/// The single local user profile.
#[derive(Debug, Default, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Profile {
    pub username: Option<String>,
    /// Local path of the avatar image. Meaningless on any other device.
    pub avatar_path: Option<String>,
}
