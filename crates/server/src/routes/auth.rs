use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use teambeat_api::{TokenPurpose, crypto, db, service};

use crate::config::AppConfig;
use crate::error::ApiErr;
use crate::mailer::{self, Mailer, OutgoingEmail};
use crate::routes::{collect, deliver, flash_redirect, organizations};
use crate::session::{AuthUser, FlashLevel, SessionHandle, SessionState};
use crate::storage::{self, Db};
use crate::tokens::{self, RedeemError};
use crate::{urls, views};

const FORM_ERRORS: &str = "Something went wrong. Please correct errors below.";
const PASSWORD_HELP: &str =
    "Minimum 8 characters. Must contain at least 1 letter, 1 number and 1 special character.";
const LOGIN_LINK_SENT: &str = "If an account exists for that email, a login link has been sent.";
const RESET_LINK_SENT: &str =
    "If an account exists for that email, a password reset link has been sent.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// `email` accepts a username as well.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailForm {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordForm {
    pub password: String,
}

/// `?token=&user=` on emailed links.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenQuery {
    pub token: Option<String>,
    pub user: Option<String>,
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// GET /register/
pub async fn register_page(session: SessionHandle) -> Response {
    register_form(&session, &RegisterForm::default(), &[])
}

/// POST /register/ — create an account with a password.
pub async fn register(
    State(db): State<Db>,
    session: SessionHandle,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiErr> {
    let mut problems = Vec::new();
    let email = collect(&mut problems, service::validate_email(&form.email));
    let first_name = collect(
        &mut problems,
        service::validate_name("First name", &form.first_name),
    );
    let last_name = collect(
        &mut problems,
        service::validate_name("Last name", &form.last_name),
    );
    collect(&mut problems, service::validate_password(&form.password));

    if let Some(email) = &email {
        let conn = db.conn();
        let taken = storage::query_flag(&conn, db::users::email_taken(email, None))
            .map_err(ApiErr::from_db("check email"))?;
        if taken {
            problems.push("Invalid email: Email address already in use by another account.".into());
        }
    }

    let (Some(email), Some(first_name), Some(last_name), true) =
        (email, first_name, last_name, problems.is_empty())
    else {
        return Ok(register_form(&session, &form, &problems));
    };

    let (hash, salt) = crypto::hash_password(&form.password)?;
    let user_id = Uuid::new_v4().to_string();
    {
        let conn = db.conn();
        storage::execute(
            &conn,
            db::users::insert(
                &user_id,
                &email,
                &email,
                &first_name,
                &last_name,
                Some((&hash, &salt)),
            ),
        )
        .map_err(ApiErr::from_db("insert user"))?;
    }
    tracing::info!(user_id = %user_id, "registered user");

    Ok(flash_redirect(
        &session,
        FlashLevel::Success,
        "Registration complete! Please log in to continue.",
        urls::LOGIN.pattern,
    ))
}

fn register_form(session: &SessionHandle, form: &RegisterForm, problems: &[String]) -> Response {
    let fields = [
        views::errors(problems),
        views::input("Email", "email", "email", &form.email),
        views::input("First name", "first_name", "text", &form.first_name),
        views::input("Last name", "last_name", "text", &form.last_name),
        views::input("Password", "password", "password", ""),
        format!("<p class=\"help\">{PASSWORD_HELP}</p>"),
    ]
    .concat();
    let body = format!(
        "<h1>Create an account</h1>{}<p>{}</p>",
        views::form(urls::REGISTER.pattern, &fields, "Register"),
        views::link(urls::LOGIN.pattern, "Already registered? Log in"),
    );
    views::page(session, "Register", &body).into_response()
}

// ---------------------------------------------------------------------------
// Log in / log out
// ---------------------------------------------------------------------------

/// GET /login/ — the login form, or redeem an emailed login link.
pub async fn login_page(
    State(db): State<Db>,
    session: SessionHandle,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiErr> {
    if let (Some(token), Some(username)) = (query.token.as_deref(), query.user.as_deref()) {
        let conn = db.conn();
        match tokens::redeem(&conn, token, username, TokenPurpose::Login, Utc::now()) {
            Ok(user) => return complete_login(&conn, &session, &user.id),
            Err(RedeemError::Token(e)) => session.flash(FlashLevel::Error, e.to_string()),
            Err(RedeemError::Db(e)) => return Err(ApiErr::from_db("redeem login token")(e)),
        }
    }
    Ok(login_form(&session, ""))
}

/// POST /login/ — username-or-email and password.
pub async fn login(
    State(db): State<Db>,
    session: SessionHandle,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiErr> {
    let identifier = form.email.trim();
    if identifier.is_empty() || form.password.is_empty() {
        session.flash(FlashLevel::Error, FORM_ERRORS);
        return Ok(login_form(&session, identifier));
    }

    let lookup = if identifier.contains('@') {
        db::users::get_by_email(identifier)
    } else {
        db::users::get_by_username(identifier)
    };
    let user = {
        let conn = db.conn();
        storage::query_one(&conn, lookup, storage::user_from_row)
            .map_err(ApiErr::from_db("find user"))?
    };
    let Some(user) = user else {
        session.flash(FlashLevel::Error, "User matching email does not exist.");
        return Ok(login_form(&session, identifier));
    };

    let valid = match (&user.password_hash, &user.password_salt) {
        (Some(hash), Some(salt)) => crypto::verify_password(&form.password, hash, salt),
        _ => false,
    };
    if !valid {
        tracing::info!(user_id = %user.id, "rejected login: wrong password");
        session.flash(FlashLevel::Error, "Password incorrect.");
        return Ok(login_form(&session, identifier));
    }

    let conn = db.conn();
    complete_login(&conn, &session, &user.id)
}

/// Authenticate the session and send the user on: to the page that bounced
/// them to login if there was one, else the dashboard.
fn complete_login(
    conn: &Connection,
    session: &SessionHandle,
    user_id: &str,
) -> Result<Response, ApiErr> {
    session.rotate()?;
    let redirect_from = session.update(|s| {
        let from = s.login_redirect_from.take();
        s.log_in(user_id);
        s.flash(FlashLevel::Success, "Log in successful.");
        from
    });
    organizations::auto_select(conn, session, user_id)?;
    tracing::info!(user_id, "logged in");

    let target = redirect_from
        .as_deref()
        .and_then(urls::safe_local_path)
        .unwrap_or(urls::DASHBOARD.pattern);
    Ok(Redirect::to(target).into_response())
}

fn login_form(session: &SessionHandle, email: &str) -> Response {
    let fields = [
        views::input("Email", "email", "text", email),
        views::input("Password", "password", "password", ""),
    ]
    .concat();
    let body = format!(
        "<h1>Log in</h1>{}<ul class=\"links\"><li>{}</li><li>{}</li><li>{}</li></ul>",
        views::form(urls::LOGIN.pattern, &fields, "Log in"),
        views::link(urls::LOGIN_LINK.pattern, "Email me a login link"),
        views::link(urls::RESET_PASSWORD_REQUEST.pattern, "Forgot your password?"),
        views::link(urls::REGISTER.pattern, "Create an account"),
    );
    views::page(session, "Log in", &body).into_response()
}

/// GET /logout/
pub async fn logout(session: SessionHandle) -> Result<Response, ApiErr> {
    session.update(SessionState::log_out);
    session.rotate()?;
    Ok(flash_redirect(
        &session,
        FlashLevel::Success,
        "Logged out.",
        urls::LOGIN.pattern,
    ))
}

// ---------------------------------------------------------------------------
// Emailed links
// ---------------------------------------------------------------------------

/// GET /login/link/
pub async fn login_link_page(session: SessionHandle) -> Response {
    email_request_form(
        &session,
        "Email me a login link",
        urls::LOGIN_LINK.pattern,
        "Send link",
    )
}

/// POST /login/link/ — always answers the same way, whether or not the
/// address has an account.
pub async fn request_login_link(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    State(mailer): State<Mailer>,
    session: SessionHandle,
    Form(form): Form<EmailForm>,
) -> Result<Response, ApiErr> {
    if let Some(email) = token_email(&db, &config, &form.email, TokenPurpose::Login)? {
        deliver(&mailer, &db, email).await;
    }
    Ok(flash_redirect(
        &session,
        FlashLevel::Info,
        LOGIN_LINK_SENT,
        urls::LOGIN.pattern,
    ))
}

/// GET /resetpassword/request/
pub async fn reset_request_page(session: SessionHandle) -> Response {
    email_request_form(
        &session,
        "Reset your password",
        urls::RESET_PASSWORD_REQUEST.pattern,
        "Send reset link",
    )
}

/// POST /resetpassword/request/
pub async fn request_password_reset(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    State(mailer): State<Mailer>,
    session: SessionHandle,
    Form(form): Form<EmailForm>,
) -> Result<Response, ApiErr> {
    if let Some(email) = token_email(&db, &config, &form.email, TokenPurpose::Reset)? {
        deliver(&mailer, &db, email).await;
    }
    Ok(flash_redirect(
        &session,
        FlashLevel::Info,
        RESET_LINK_SENT,
        urls::LOGIN.pattern,
    ))
}

/// Issue a token for the account behind `raw_email` and build its email.
/// `None` when there is no such account.
fn token_email(
    db: &Db,
    config: &AppConfig,
    raw_email: &str,
    purpose: TokenPurpose,
) -> Result<Option<OutgoingEmail>, ApiErr> {
    let Ok(email) = service::validate_email(raw_email) else {
        return Ok(None);
    };
    let conn = db.conn();
    let Some(user) = storage::query_one(&conn, db::users::get_by_email(&email), storage::user_from_row)
        .map_err(ApiErr::from_db("find user"))?
    else {
        tracing::info!(%purpose, "token requested for unknown email");
        return Ok(None);
    };

    let issued = tokens::issue(&conn, &user.id, purpose, Utc::now())?;
    let link = service::token_link(&config.base_url, purpose, &issued.value, &user.username);
    Ok(Some(match purpose {
        TokenPurpose::Login => mailer::login_link_email(&user.email, &link),
        TokenPurpose::Reset => mailer::password_reset_email(&user.email, &link),
    }))
}

fn email_request_form(session: &SessionHandle, title: &str, action: &str, submit: &str) -> Response {
    let body = format!(
        "<h1>{}</h1>{}",
        views::escape(title),
        views::form(action, &views::input("Email", "email", "email", ""), submit),
    );
    views::page(session, title, &body).into_response()
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

/// GET /resetpassword/?token=&user= — show the form if the token is good.
pub async fn reset_password_page(
    State(db): State<Db>,
    session: SessionHandle,
    Query(query): Query<TokenQuery>,
) -> Result<Response, ApiErr> {
    let token = query.token.unwrap_or_default();
    let username = query.user.unwrap_or_default();
    let checked = {
        let conn = db.conn();
        tokens::peek(&conn, &token, &username, TokenPurpose::Reset, Utc::now())
    };
    match checked {
        Ok(_) => Ok(token_reset_form(&session, &token, &username, &[])),
        Err(e) => token_failure(&session, e),
    }
}

/// POST /resetpassword/?token=&user= — set a new password and consume the
/// token. The password always goes to the token's owner.
pub async fn reset_password(
    State(db): State<Db>,
    session: SessionHandle,
    Query(query): Query<TokenQuery>,
    Form(form): Form<PasswordForm>,
) -> Result<Response, ApiErr> {
    let token = query.token.unwrap_or_default();
    let username = query.user.unwrap_or_default();

    let checked = {
        let conn = db.conn();
        tokens::peek(&conn, &token, &username, TokenPurpose::Reset, Utc::now())
    };
    if let Err(e) = checked {
        return token_failure(&session, e);
    }
    if let Err(e) = service::validate_password(&form.password) {
        return Ok(token_reset_form(
            &session,
            &token,
            &username,
            &[e.message().to_string()],
        ));
    }

    let (hash, salt) = crypto::hash_password(&form.password)?;
    let conn = db.conn();
    let user = match tokens::redeem(&conn, &token, &username, TokenPurpose::Reset, Utc::now()) {
        Ok(user) => user,
        Err(e) => return token_failure(&session, e),
    };
    storage::execute(&conn, db::users::update_password(&user.id, &hash, &salt))
        .map_err(ApiErr::from_db("update password"))?;
    tracing::info!(user_id = %user.id, "password reset by token");

    Ok(flash_redirect(
        &session,
        FlashLevel::Success,
        "Password reset. Please log in to continue.",
        urls::LOGIN.pattern,
    ))
}

fn token_failure(session: &SessionHandle, err: RedeemError) -> Result<Response, ApiErr> {
    match err {
        RedeemError::Token(e) => {
            session.flash(FlashLevel::Error, e.to_string());
            let body = format!(
                "<h1>Reset password</h1><p>{}</p>",
                views::link(urls::RESET_PASSWORD_REQUEST.pattern, "Request a new reset link")
            );
            Ok(views::page(session, "Reset password", &body).into_response())
        }
        RedeemError::Db(e) => Err(ApiErr::from_db("check reset token")(e)),
    }
}

fn token_reset_form(
    session: &SessionHandle,
    token: &str,
    username: &str,
    problems: &[String],
) -> Response {
    let action = service::token_path(TokenPurpose::Reset, token, username);
    password_form(session, &action, problems)
}

fn password_form(session: &SessionHandle, action: &str, problems: &[String]) -> Response {
    let fields = [
        views::errors(problems),
        views::input("New password", "password", "password", ""),
        format!("<p class=\"help\">{PASSWORD_HELP}</p>"),
    ]
    .concat();
    let body = format!(
        "<h1>Reset password</h1>{}",
        views::form(action, &fields, "Reset password")
    );
    views::page(session, "Reset password", &body).into_response()
}

/// GET /profile/resetpassword/
pub async fn profile_reset_password_page(user: AuthUser) -> Response {
    password_form(&user.session, urls::PROFILE_RESET_PASSWORD.pattern, &[])
}

/// POST /profile/resetpassword/ — change the password, then log out.
pub async fn profile_reset_password(
    State(db): State<Db>,
    user: AuthUser,
    Form(form): Form<PasswordForm>,
) -> Result<Response, ApiErr> {
    if let Err(e) = service::validate_password(&form.password) {
        return Ok(password_form(
            &user.session,
            urls::PROFILE_RESET_PASSWORD.pattern,
            &[e.message().to_string()],
        ));
    }
    let (hash, salt) = crypto::hash_password(&form.password)?;
    {
        let conn = db.conn();
        storage::execute(&conn, db::users::update_password(&user.user_id, &hash, &salt))
            .map_err(ApiErr::from_db("update password"))?;
    }
    tracing::info!(user_id = %user.user_id, "password changed from profile");

    user.session.update(SessionState::log_out);
    user.session.rotate()?;
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        "Your password has been reset. Please log in again to continue.",
        urls::LOGIN.pattern,
    ))
}
