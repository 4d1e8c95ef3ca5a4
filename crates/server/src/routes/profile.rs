use std::collections::HashMap;

use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use teambeat_api::{db, service};

use crate::error::ApiErr;
use crate::routes::{collect, flash_redirect, load_user, organizations};
use crate::session::{AuthUser, FlashLevel};
use crate::storage::{self, Db, UserRow};
use crate::{urls, views};

/// Either a profile update or, when `organization_id` is present, an
/// organization switch.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub organization_id: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// GET /profile/ — profile form, organizations, pending invitations
pub async fn profile_page(State(db): State<Db>, user: AuthUser) -> Result<Response, ApiErr> {
    let profile = {
        let conn = db.conn();
        load_user(&conn, &user.user_id)?
    };
    let form = ProfileForm {
        organization_id: None,
        email: profile.email.clone(),
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
    };
    render(&db, &user, &profile, &form, &[])
}

/// POST /profile/
pub async fn update_profile(
    State(db): State<Db>,
    user: AuthUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ApiErr> {
    if let Some(org_id) = form.organization_id.as_deref().filter(|id| !id.is_empty()) {
        return organizations::switch_organization(&db, &user, org_id);
    }

    let mut problems = Vec::new();
    let email = collect(&mut problems, service::validate_email(&form.email));
    let first_name = collect(&mut problems, service::validate_name("First name", &form.first_name));
    let last_name = collect(&mut problems, service::validate_name("Last name", &form.last_name));

    let conn = db.conn();
    let profile = load_user(&conn, &user.user_id)?;
    if let Some(email) = &email {
        let taken = storage::query_flag(&conn, db::users::email_taken(email, Some(&user.user_id)))
            .map_err(ApiErr::from_db("check email"))?;
        if taken {
            problems.push("Email address already in use by another account.".into());
        }
    }

    let (Some(email), Some(first_name), Some(last_name), true) =
        (email, first_name, last_name, problems.is_empty())
    else {
        drop(conn);
        return render(&db, &user, &profile, &form, &problems);
    };

    storage::execute(
        &conn,
        db::users::update_profile(&user.user_id, &email, &first_name, &last_name),
    )
    .map_err(ApiErr::from_db("update profile"))?;
    tracing::info!(user_id = %user.user_id, "updated profile");
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        "Profile updated.",
        urls::PROFILE.pattern,
    ))
}

fn render(
    db: &Db,
    user: &AuthUser,
    profile: &UserRow,
    form: &ProfileForm,
    problems: &[String],
) -> Result<Response, ApiErr> {
    let (orgs, invitations) = {
        let conn = db.conn();
        let orgs = storage::query_all(&conn, db::organizations::list_for_user(&user.user_id), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(ApiErr::from_db("list organizations"))?;
        let invitations =
            storage::query_all(&conn, db::invitations::list_for_user(&user.user_id), |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(ApiErr::from_db("list invitations"))?;
        (orgs, invitations)
    };

    let fields = [
        views::errors(problems),
        views::input("Email", "email", "email", &form.email),
        views::input("First name", "first_name", "text", &form.first_name),
        views::input("Last name", "last_name", "text", &form.last_name),
    ]
    .concat();
    let password_note = if profile.password_hash.is_some() {
        "Change your password"
    } else {
        "Set a password"
    };

    let mut body = format!(
        "<h1>Profile</h1>{}<p>{}</p>",
        views::form(urls::PROFILE.pattern, &fields, "Save"),
        views::link(urls::PROFILE_RESET_PASSWORD.pattern, password_note)
    );

    body.push_str("<h2>Organizations</h2>");
    if orgs.is_empty() {
        body.push_str("<p>You are not part of any organization.</p>");
    } else {
        body.push_str(&views::form(
            urls::PROFILE.pattern,
            &views::select("Switch to", "organization_id", &orgs),
            "Switch",
        ));
    }

    if !invitations.is_empty() {
        let rows: Vec<Vec<String>> = invitations
            .iter()
            .map(|(org_id, name)| {
                let action = urls::organization_invitation(org_id);
                vec![
                    views::escape(name),
                    format!(
                        "{}{}",
                        views::form(&action, &views::hidden("accept-invitation", "1"), "Accept"),
                        views::form(&action, &views::hidden("decline-invitation", "1"), "Decline"),
                    ),
                ]
            })
            .collect();
        body.push_str("<h2>Invitations</h2>");
        body.push_str(&views::table(&["Organization", ""], &rows));
    }

    Ok(views::page(&user.session, "Profile", &body).into_response())
}

/// POST /organization/invitation/{organization_id}/ — accept or decline,
/// keyed by which submit field is present.
pub async fn answer_invitation(
    State(db): State<Db>,
    user: AuthUser,
    Path(org_id): Path<String>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Response, ApiErr> {
    let mut conn = db.conn();
    let org_name = storage::query_one(&conn, db::organizations::get_by_id(&org_id), |row| {
        row.get::<_, String>(1)
    })
    .map_err(ApiErr::from_db("load organization"))?;
    let Some(org_name) = org_name else {
        return Ok(flash_redirect(
            &user.session,
            FlashLevel::Error,
            "Organization not found",
            urls::PROFILE.pattern,
        ));
    };
    let invitation_id = storage::query_one(
        &conn,
        db::invitations::find(&org_id, &user.user_id),
        |row| row.get::<_, String>(0),
    )
    .map_err(ApiErr::from_db("find invitation"))?;
    let Some(invitation_id) = invitation_id else {
        return Ok(flash_redirect(
            &user.session,
            FlashLevel::Error,
            "Invitation not found",
            urls::PROFILE.pattern,
        ));
    };

    if !fields.contains_key("accept-invitation") {
        storage::execute(&conn, db::invitations::delete(&org_id, &invitation_id))
            .map_err(ApiErr::from_db("delete invitation"))?;
        tracing::info!(org_id = %org_id, user_id = %user.user_id, "declined invitation");
        return Ok(flash_redirect(
            &user.session,
            FlashLevel::Info,
            format!("Invitation to organization \"{org_name}\" dismissed."),
            urls::PROFILE.pattern,
        ));
    }

    let existing = storage::query_one(
        &conn,
        db::organizations::get_org_user(&org_id, &user.user_id),
        storage::org_user_from_row,
    )
    .map_err(ApiErr::from_db("find organization user"))?;

    let tx = conn
        .transaction()
        .map_err(ApiErr::from_db("begin transaction"))?;
    storage::execute(&tx, db::invitations::delete(&org_id, &invitation_id))
        .map_err(ApiErr::from_db("delete invitation"))?;
    let message = match existing {
        Some(ou) if ou.active => {
            format!("You are already part of organization \"{org_name}\". Invitation dismissed.")
        }
        Some(ou) => {
            storage::execute(&tx, db::organizations::set_active(&ou.id, true))
                .map_err(ApiErr::from_db("reactivate organization user"))?;
            format!("You have been added to organization \"{org_name}\"")
        }
        None => {
            storage::execute(
                &tx,
                db::organizations::insert_org_user(
                    &Uuid::new_v4().to_string(),
                    &org_id,
                    &user.user_id,
                    false,
                ),
            )
            .map_err(ApiErr::from_db("insert organization user"))?;
            format!("You have been added to organization \"{org_name}\"")
        }
    };
    tx.commit().map_err(ApiErr::from_db("commit invitation"))?;
    tracing::info!(org_id = %org_id, user_id = %user.user_id, "accepted invitation");

    if user.organization().is_none() {
        user.session.update(|s| s.organization = Some(org_id.clone()));
    }
    Ok(flash_redirect(
        &user.session,
        FlashLevel::Success,
        message,
        urls::PROFILE.pattern,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use teambeat_api::db;

    use crate::storage;
    use crate::test_support::{TestApp, body_string, get, location, post_form};

    #[tokio::test]
    async fn profile_update_checks_email_against_other_accounts() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        app.create_user("bob@example.com", "Bob", "Builder");
        let cookie = app.login_cookie(&ada);

        let taken = app
            .send(post_form(
                "/profile/",
                Some(&cookie),
                "email=bob%40example.com&first_name=Ada&last_name=Lovelace",
            ))
            .await;
        assert_eq!(taken.status(), StatusCode::OK);
        assert!(body_string(taken).await.contains("Email address already in use by another account."));

        let same = app
            .send(post_form(
                "/profile/",
                Some(&cookie),
                "email=ADA%40example.com&first_name=Augusta&last_name=King",
            ))
            .await;
        assert_eq!(location(&same), "/profile/");

        let conn = app.state.db.conn();
        let row = storage::query_one(&conn, db::users::get_by_id(&ada.id), storage::user_from_row)
            .unwrap()
            .unwrap();
        assert_eq!(row.first_name, "Augusta");
        assert_eq!(row.username, row.email);
    }

    #[tokio::test]
    async fn profile_switches_organization() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let acme = app.create_org("Acme", &ada);
        let globex = app.create_org("Globex", &ada);
        let cookie = app.login_cookie_in(&ada, &acme);

        let page = app.send(get("/profile/", Some(&cookie))).await;
        let body = body_string(page).await;
        assert!(body.contains("Acme") && body.contains("Globex"));

        let response = app
            .send(post_form("/profile/", Some(&cookie), &format!("organization_id={globex}")))
            .await;
        assert_eq!(location(&response), "/");
        assert_eq!(app.session_state(&cookie).organization, Some(globex));
    }

    #[tokio::test]
    async fn accepting_an_invitation_joins_the_organization() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        app.invite(&org_id, &bob, &ada);
        let cookie = app.login_cookie(&bob);

        let page = app.send(get("/profile/", Some(&cookie))).await;
        assert!(body_string(page).await.contains(&format!("/organization/invitation/{org_id}/")));

        let response = app
            .send(post_form(
                &format!("/organization/invitation/{org_id}/"),
                Some(&cookie),
                "accept-invitation=1",
            ))
            .await;
        assert_eq!(location(&response), "/profile/");
        let page = app.send(get("/profile/", Some(&cookie))).await;
        assert!(body_string(page).await.contains("You have been added to organization &quot;Acme&quot;"));

        let conn = app.state.db.conn();
        assert!(storage::query_flag(&conn, db::organizations::has_role(&org_id, &bob.id, false)).unwrap());
        assert!(!storage::query_flag(&conn, db::invitations::exists(&org_id, &bob.id)).unwrap());
        drop(conn);
        assert_eq!(app.session_state(&cookie).organization, Some(org_id));
    }

    #[tokio::test]
    async fn declining_and_missing_invitations() {
        let app = TestApp::new();
        let ada = app.create_user("ada@example.com", "Ada", "Lovelace");
        let bob = app.create_user("bob@example.com", "Bob", "Builder");
        let org_id = app.create_org("Acme", &ada);
        app.invite(&org_id, &bob, &ada);
        let cookie = app.login_cookie(&bob);
        let uri = format!("/organization/invitation/{org_id}/");

        app.send(post_form(&uri, Some(&cookie), "decline-invitation=1")).await;
        let page = app.send(get("/profile/", Some(&cookie))).await;
        assert!(body_string(page).await.contains("Invitation to organization &quot;Acme&quot; dismissed."));

        app.send(post_form(&uri, Some(&cookie), "accept-invitation=1")).await;
        let page = app.send(get("/profile/", Some(&cookie))).await;
        assert!(body_string(page).await.contains("Invitation not found"));

        app.send(post_form("/organization/invitation/nope/", Some(&cookie), "accept-invitation=1"))
            .await;
        let page = app.send(get("/profile/", Some(&cookie))).await;
        assert!(body_string(page).await.contains("Organization not found"));

        let conn = app.state.db.conn();
        assert!(!storage::query_flag(&conn, db::organizations::has_role(&org_id, &bob.id, false)).unwrap());
    }
}
