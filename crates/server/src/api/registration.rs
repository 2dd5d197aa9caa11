use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;

use msgbridge_core::{
    AccountCreationStep, EmailCheckData, PhoneCheckData, SendOtpData, VerifyEmailData,
    AccountCreationData as SequenceAccountCreationData,
};
use msgbridge_gateway::{
    validate_email, validate_phone, GatewayError, RateLimitIdentifierType, RateLimitRule, StepPayload,
};
use msgbridge_identity::{AccountCreationData as IdentityAccountCreationData, IdentifierType};

use crate::error::ApiError;
use crate::state::AppState;

/// Default rule applied to a registration step when no
/// `RATE_LIMIT_<rule>_{LIMIT,PERIOD}` pair is configured for it.
fn default_rate_limit() -> RateLimitRule {
    RateLimitRule { limit: 20, period: std::time::Duration::from_secs(60), identifier_type: RateLimitIdentifierType::Phone }
}

/// Enforce `rule_name`'s configured (or default) limit for `identifier`,
/// mirroring `WebhookIngress::handle`'s rate-limit gate.
async fn enforce_rate_limit(
    state: &AppState,
    rule_name: &'static str,
    identifier: &str,
) -> Result<(), ApiError> {
    let rule = state.config.rate_limit(rule_name).cloned().unwrap_or_else(default_rate_limit);
    let result = state
        .rate_limiter
        .check(rule_name, identifier, &rule)
        .await
        .map_err(|e| ApiError::new(rule_name, GatewayError::from(e)))?;
    if !result.allowed {
        return Err(ApiError::new(rule_name, GatewayError::RateLimit { retry_after: result.retry_after }));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CheckPhoneRequest {
    pub phone_number: String,
}

/// `POST /check_phone` -- first step of the registration sequence.
pub async fn check_phone(State(state): State<AppState>, Json(req): Json<CheckPhoneRequest>) -> Result<impl IntoResponse, ApiError> {
    let phone_number = validate_phone(&req.phone_number).map_err(|e| ApiError::new("check_phone", e))?;
    enforce_rate_limit(&state, "check_phone", &phone_number).await?;

    state
        .sequence
        .validate_step(&phone_number, AccountCreationStep::CheckPhone)
        .await
        .map_err(|e| ApiError::new("check_phone", e))?;

    let now = Utc::now();
    state
        .sequence
        .store_step_data(
            &phone_number,
            StepPayload::CheckPhone(PhoneCheckData { phone_number: phone_number.clone(), verification_status: true, timestamp: now }),
        )
        .await
        .map_err(|e| ApiError::new("check_phone", e))?;
    state.sequence.update_step(&phone_number, AccountCreationStep::CheckPhone).await.map_err(|e| ApiError::new("check_phone", e))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "next_action": "check_email",
        "data": { "phone_number": phone_number },
    })))
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailRequest {
    pub phone_number: String,
    pub email: String,
}

/// `POST /check_email` -- second step of the registration sequence.
pub async fn check_email(State(state): State<AppState>, Json(req): Json<CheckEmailRequest>) -> Result<impl IntoResponse, ApiError> {
    let phone_number = validate_phone(&req.phone_number).map_err(|e| ApiError::new("check_email", e))?;
    validate_email(&req.email).map_err(|e| ApiError::new("check_email", e))?;
    enforce_rate_limit(&state, "check_email", &phone_number).await?;

    state
        .sequence
        .validate_step(&phone_number, AccountCreationStep::CheckEmail)
        .await
        .map_err(|e| ApiError::new("check_email", e))?;

    let now = Utc::now();
    state
        .sequence
        .store_step_data(
            &phone_number,
            StepPayload::CheckEmail(EmailCheckData {
                phone_number: phone_number.clone(),
                email: req.email.clone(),
                verification_status: true,
                timestamp: now,
            }),
        )
        .await
        .map_err(|e| ApiError::new("check_email", e))?;
    state.sequence.update_step(&phone_number, AccountCreationStep::CheckEmail).await.map_err(|e| ApiError::new("check_email", e))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "next_action": "create_account",
        "data": { "phone_number": phone_number, "email": req.email },
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub phone_number: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub country: String,
}

fn generate_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!@#$%";
    let mut rng = rand::thread_rng();
    (0..20).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

/// `POST /create_account` -- third step: provisions the identity record.
pub async fn create_account(State(state): State<AppState>, Json(req): Json<CreateAccountRequest>) -> Result<impl IntoResponse, ApiError> {
    let phone_number = validate_phone(&req.phone_number).map_err(|e| ApiError::new("create_account", e))?;
    validate_email(&req.email).map_err(|e| ApiError::new("create_account", e))?;
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(ApiError::new("create_account", GatewayError::InvalidData("first_name/last_name required".into())));
    }
    enforce_rate_limit(&state, "create_account", &phone_number).await?;

    state
        .sequence
        .validate_step(&phone_number, AccountCreationStep::CreateAccount)
        .await
        .map_err(|e| ApiError::new("create_account", e))?;

    let user_id = state
        .identity
        .create_user(&IdentityAccountCreationData {
            email: req.email.clone(),
            phone: phone_number.clone(),
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            password: generate_password(),
        })
        .await
        .map_err(|e| ApiError::new("create_account", GatewayError::Identity(e)))?;

    let now = Utc::now();
    state
        .sequence
        .store_step_data(
            &phone_number,
            StepPayload::CreateAccount(SequenceAccountCreationData {
                phone_number: phone_number.clone(),
                email: req.email,
                first_name: req.first_name,
                last_name: req.last_name,
                gender: req.gender,
                country: req.country,
                user_id: Some(user_id.clone()),
                timestamp: now,
            }),
        )
        .await
        .map_err(|e| ApiError::new("create_account", e))?;
    state
        .sequence
        .update_step(&phone_number, AccountCreationStep::CreateAccount)
        .await
        .map_err(|e| ApiError::new("create_account", e))?;

    Ok(Json(serde_json::json!({ "user_id": user_id, "next_action": "send_email_otp" })))
}

#[derive(Debug, Deserialize)]
pub struct SendEmailOtpRequest {
    pub phone_number: String,
    pub email: String,
}

/// `POST /send_email_otp` -- fourth step: dispatches a one-time passcode.
pub async fn send_email_otp(State(state): State<AppState>, Json(req): Json<SendEmailOtpRequest>) -> Result<impl IntoResponse, ApiError> {
    let phone_number = validate_phone(&req.phone_number).map_err(|e| ApiError::new("send_email_otp", e))?;
    validate_email(&req.email).map_err(|e| ApiError::new("send_email_otp", e))?;
    enforce_rate_limit(&state, "send_email_otp", &phone_number).await?;

    state
        .sequence
        .validate_step(&phone_number, AccountCreationStep::SendEmailOtp)
        .await
        .map_err(|e| ApiError::new("send_email_otp", e))?;

    state.otp.send(&req.email, &phone_number).await.map_err(|e| ApiError::new("send_email_otp", e))?;

    let now = Utc::now();
    state
        .sequence
        .store_step_data(
            &phone_number,
            StepPayload::SendEmailOtp(SendOtpData { email: req.email, otp_sent: true, otp_sent_at: now, attempts: 0 }),
        )
        .await
        .map_err(|e| ApiError::new("send_email_otp", e))?;
    state
        .sequence
        .update_step(&phone_number, AccountCreationStep::SendEmailOtp)
        .await
        .map_err(|e| ApiError::new("send_email_otp", e))?;

    Ok(Json(serde_json::json!({ "next_action": "verify_email" })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
}

/// `POST /verify_email` -- final step: confirms the one-time passcode.
///
/// Unlike the other steps this one is keyed by email rather than phone
/// number in the request body; the phone number needed to advance the
/// sequence is recovered from the OTP record itself, which `send_email_otp`
/// stamped with it.
pub async fn verify_email(State(state): State<AppState>, Json(req): Json<VerifyEmailRequest>) -> Result<impl IntoResponse, ApiError> {
    validate_email(&req.email).map_err(|e| ApiError::new("verify_email", e))?;
    enforce_rate_limit(&state, "verify_email", &req.email).await?;

    let phone_number = state.otp.verify(&req.email, &req.otp).await.map_err(|e| ApiError::new("verify_email", e))?;

    state
        .sequence
        .validate_step(&phone_number, AccountCreationStep::VerifyEmail)
        .await
        .map_err(|e| ApiError::new("verify_email", e))?;

    let now = Utc::now();
    state
        .sequence
        .store_step_data(
            &phone_number,
            StepPayload::VerifyEmail(VerifyEmailData {
                email: req.email.clone(),
                verified: true,
                verified_at: Some(now),
                verification_attempts: 1,
                last_attempt: Some(now),
            }),
        )
        .await
        .map_err(|e| ApiError::new("verify_email", e))?;
    state
        .sequence
        .update_step(&phone_number, AccountCreationStep::VerifyEmail)
        .await
        .map_err(|e| ApiError::new("verify_email", e))?;

    Ok(Json(serde_json::json!({ "verified": true })))
}

#[derive(Debug, Deserialize)]
pub struct GetUserInfoRequest {
    pub identifier: String,
    pub identifier_type: String,
}

/// `POST /get_user_info` -- look up a provisioned user by email or phone.
pub async fn get_user_info(State(state): State<AppState>, Json(req): Json<GetUserInfoRequest>) -> Result<impl IntoResponse, ApiError> {
    let identifier_type = match req.identifier_type.as_str() {
        "email" => IdentifierType::Email,
        "phone" => IdentifierType::Phone,
        other => return Err(ApiError::new("get_user_info", GatewayError::InvalidData(format!("unknown identifier_type: {other}")))),
    };

    let user = state
        .identity
        .get_user(&req.identifier, identifier_type)
        .await
        .map_err(|e| ApiError::new("get_user_info", GatewayError::Identity(e)))?
        .ok_or_else(|| ApiError::new("get_user_info", GatewayError::DataNotFound(req.identifier.clone())))?;

    Ok(Json(serde_json::json!({
        "user_id": user.user_id,
        "email": user.email,
        "phone": user.phone,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "enabled": user.enabled,
    })))
}
