// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android platform bridge via JNI.
//
// Requires the Android NDK and targets `aarch64-linux-android` or
// `armv7-linux-androideabi`. Calls go into `android.telephony.TelephonyManager`
// through the ART runtime.
//
// ## Callback shim
//
// `TelephonyManager.UssdResponseCallback` is an abstract Java class, so it
// cannot be implemented from Rust directly. The app ships
// `android/UssdCallbackShim.java`, a subclass that stores a session token and
// forwards both callback methods to the `native*` functions at the bottom of
// this file. Those look the token up in `PENDING_CALLBACKS` and post the
// result to the plugin queue; they never touch plugin state themselves.

#![cfg(target_os = "android")]

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, OnceLock};

use jni::objects::{JClass, JObject, JString, JValue};
use jni::sys::{jint, jlong};
use jni::JNIEnv;

use ussd_core::error::{Result, UssdError};
use ussd_core::types::{PlatformVariant, SessionToken, SuccessPayload};

use crate::relay::CallbackHandle;
use crate::traits::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// `Context.TELEPHONY_SERVICE`.
const TELEPHONY_SERVICE: &str = "phone";

/// `TelephonyManager.SIM_STATE_READY`.
const SIM_STATE_READY: jint = 5;

/// `TelephonyManager.NETWORK_TYPE_UNKNOWN`.
const NETWORK_TYPE_UNKNOWN: jint = 0;

/// Binary name of the Java callback shim, as passed to `ClassLoader.loadClass`.
const CALLBACK_SHIM_CLASS: &str = "org.hyperpolymath.ussdrelay.UssdCallbackShim";

/// Requests issued to the OS that have not called back yet, keyed by token.
static PENDING_CALLBACKS: LazyLock<Mutex<HashMap<u64, CallbackHandle>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn register_callback(callback: CallbackHandle) {
    let mut pending = PENDING_CALLBACKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    pending.insert(callback.token().0, callback);
}

fn take_callback(token: jlong) -> Option<CallbackHandle> {
    let mut pending = PENDING_CALLBACKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    pending.remove(&(token as u64))
}

// ---------------------------------------------------------------------------
// JNI bootstrap helpers
// ---------------------------------------------------------------------------

/// The process-wide `JavaVM`, resolved once from the NDK context.
static JAVA_VM: OnceLock<jni::JavaVM> = OnceLock::new();

fn java_vm() -> Result<&'static jni::JavaVM> {
    if let Some(vm) = JAVA_VM.get() {
        return Ok(vm);
    }
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code.
    // The pointer is guaranteed valid for the lifetime of the process.
    let vm = unsafe { jni::JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| UssdError::Bridge(format!("failed to obtain JavaVM: {e}")))?;
    Ok(JAVA_VM.get_or_init(|| vm))
}

/// Obtain a [`JNIEnv`] for the current thread, attaching it if needed.
///
/// The plugin's main context and the OS callback threads both come through
/// here, so threads stay attached for the life of the process.
fn jni_env() -> Result<JNIEnv<'static>> {
    java_vm()?
        .attach_current_thread_permanently()
        .map_err(|e| UssdError::Bridge(format!("failed to attach JNI thread: {e}")))
}

/// Obtain the hosting Android `Context` as a [`JObject`].
fn context() -> Result<JObject<'static>> {
    let ctx = ndk_context::android_context();
    let ptr = ctx.context();
    if ptr.is_null() {
        return Err(UssdError::Bridge(
            "Android context is null; native activity not initialised".into(),
        ));
    }
    // SAFETY: the NDK guarantees this pointer is a valid global jobject for
    // the hosting Context.
    Ok(unsafe { JObject::from_raw(ptr.cast()) })
}

/// Local references a single bridge call may create before its frame pops.
const LOCAL_FRAME_CAPACITY: i32 = 16;

/// Describe and clear a Java exception left pending by a failed call.
///
/// No further JNI call is legal on this thread until it is cleared.
fn clear_pending_exception(env: &mut JNIEnv<'_>) -> bool {
    if !env.exception_check().unwrap_or(false) {
        return false;
    }
    let _ = env.exception_describe();
    let _ = env.exception_clear();
    true
}

/// Run `f` on an attached env inside a fresh local frame.
///
/// Threads stay attached permanently, so local refs would otherwise never
/// be freed. Any exception `f` leaves pending is cleared before the frame
/// pops.
fn with_env<T>(f: impl FnOnce(&mut JNIEnv<'_>) -> Result<T>) -> Result<T> {
    let mut env = jni_env()?;
    env.with_local_frame(LOCAL_FRAME_CAPACITY, |env| {
        let result = f(env);
        if clear_pending_exception(env) {
            tracing::warn!("Android: cleared pending Java exception");
        }
        Ok::<_, jni::errors::Error>(result)
    })
    .map_err(|e| jni_err("with_local_frame", e))?
}

/// Convenience: map any `jni::errors::Error` into `UssdError::Bridge`.
fn jni_err(context: &str, e: jni::errors::Error) -> UssdError {
    UssdError::Bridge(format!("{context}: {e}"))
}

/// `Build.VERSION.SDK_INT`.
fn sdk_int(env: &mut JNIEnv<'_>) -> Result<u32> {
    let sdk = env
        .get_static_field("android/os/Build$VERSION", "SDK_INT", "I")
        .map_err(|e| jni_err("Build.VERSION.SDK_INT", e))?
        .i()
        .map_err(|e| jni_err("SDK_INT->i", e))?;
    Ok(sdk.max(0) as u32)
}

/// `context.getSystemService(TELEPHONY_SERVICE)`.
fn telephony_manager<'a>(env: &mut JNIEnv<'a>, context: &JObject<'_>) -> Result<JObject<'a>> {
    let j_name: JString = env
        .new_string(TELEPHONY_SERVICE)
        .map_err(|e| jni_err("new_string(TELEPHONY_SERVICE)", e))?;

    let manager = env
        .call_method(
            context,
            "getSystemService",
            "(Ljava/lang/String;)Ljava/lang/Object;",
            &[JValue::Object(&j_name)],
        )
        .map_err(|e| jni_err("getSystemService(phone)", e))?
        .l()
        .map_err(|e| jni_err("getSystemService->l", e))?;

    if manager.is_null() {
        return Err(UssdError::PlatformUnavailable);
    }
    Ok(manager)
}

/// Load an app class through the context's class loader.
///
/// `FindClass` on a natively attached thread only sees system classes, so
/// app classes like the callback shim must come from the app's loader.
fn load_app_class<'a>(
    env: &mut JNIEnv<'a>,
    context: &JObject<'_>,
    binary_name: &str,
) -> Result<JClass<'a>> {
    let loader = env
        .call_method(context, "getClassLoader", "()Ljava/lang/ClassLoader;", &[])
        .map_err(|e| jni_err("getClassLoader", e))?
        .l()
        .map_err(|e| jni_err("getClassLoader->l", e))?;

    let j_name: JString = env
        .new_string(binary_name)
        .map_err(|e| jni_err("new_string(class name)", e))?;

    let class = env
        .call_method(
            &loader,
            "loadClass",
            "(Ljava/lang/String;)Ljava/lang/Class;",
            &[JValue::Object(&j_name)],
        )
        .map_err(|e| jni_err("ClassLoader.loadClass", e))?
        .l()
        .map_err(|e| jni_err("loadClass->l", e))?;

    Ok(JClass::from(class))
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// Android implementation of the USSD platform bridge.
///
/// All SDK state lives on the Java side. `min_sdk_version` gates
/// `sendUssdRequest`, which first shipped in API 26.
pub struct AndroidBridge {
    min_sdk_version: u32,
}

impl AndroidBridge {
    /// Create a new Android bridge.
    ///
    /// This does **not** touch JNI. The first JNI call happens lazily when
    /// a trait method is invoked.
    pub fn new(min_sdk_version: u32) -> Self {
        Self { min_sdk_version }
    }
}

impl PlatformBridge for AndroidBridge {
    fn platform_name(&self) -> &str {
        "Android"
    }

    /// `"Android " + Build.VERSION.RELEASE`.
    fn platform_version(&self) -> Result<String> {
        with_env(|env| {
            let release = env
                .get_static_field("android/os/Build$VERSION", "RELEASE", "Ljava/lang/String;")
                .map_err(|e| jni_err("Build.VERSION.RELEASE", e))?
                .l()
                .map_err(|e| jni_err("RELEASE->l", e))?;
            let release: String = env
                .get_string(&JString::from(release))
                .map_err(|e| jni_err("get_string(RELEASE)", e))?
                .into();
            Ok(format!("Android {release}"))
        })
    }

    fn variant(&self) -> PlatformVariant {
        PlatformVariant::Telephony
    }
}

// ---------------------------------------------------------------------------
// NativeUssd -- TelephonyManager.sendUssdRequest
// ---------------------------------------------------------------------------

impl NativeUssd for AndroidBridge {
    /// Issue the request with a shim callback bound to `callback`'s token.
    ///
    /// The handler argument is `null`; the shim posts to the plugin queue,
    /// so the thread the OS calls back on does not matter.
    fn send_ussd(&self, code: &str, callback: CallbackHandle) -> Result<Dispatch> {
        with_env(|env| self.issue_request(env, code, callback))
    }

    fn release(&self, token: SessionToken) {
        if take_callback(token.0 as jlong).is_some() {
            tracing::debug!(%token, "Android: released unanswered USSD request");
        }
    }
}

impl AndroidBridge {
    fn issue_request(
        &self,
        env: &mut JNIEnv<'_>,
        code: &str,
        callback: CallbackHandle,
    ) -> Result<Dispatch> {
        let sdk = sdk_int(env)?;
        if sdk < self.min_sdk_version {
            return Err(UssdError::UnsupportedPlatformVersion {
                sdk,
                required: self.min_sdk_version,
            });
        }

        let context = context()?;
        let manager = telephony_manager(env, &context)?;
        let token = callback.token();

        let shim_class = load_app_class(env, &context, CALLBACK_SHIM_CLASS)?;
        let shim = env
            .new_object(&shim_class, "(J)V", &[JValue::Long(token.0 as jlong)])
            .map_err(|e| jni_err("new UssdCallbackShim", e))?;

        let j_code: JString = env
            .new_string(code)
            .map_err(|e| jni_err("new_string(ussd code)", e))?;

        tracing::info!(%token, sdk, "Android: TelephonyManager.sendUssdRequest");

        // Register before issuing: the OS may call back before this returns.
        register_callback(callback);

        let issued = env.call_method(
            &manager,
            "sendUssdRequest",
            "(Ljava/lang/String;Landroid/telephony/TelephonyManager$UssdResponseCallback;Landroid/os/Handler;)V",
            &[
                JValue::Object(&j_code),
                JValue::Object(&shim),
                JValue::Object(&JObject::null()),
            ],
        );
        if let Err(e) = issued {
            take_callback(token.0 as jlong);
            return Err(jni_err("sendUssdRequest", e));
        }

        Ok(Dispatch::AwaitingCallback)
    }
}

// ---------------------------------------------------------------------------
// NativeUssdProbe -- SIM and network state
// ---------------------------------------------------------------------------

impl NativeUssdProbe for AndroidBridge {
    /// SIM ready and a known network type.
    ///
    /// `getNetworkType` needs `READ_PHONE_STATE` on API 30+; without it the
    /// `SecurityException` is cleared and surfaces as a `Bridge` error.
    fn is_ussd_supported(&self) -> Result<bool> {
        with_env(|env| {
            let context = context()?;
            let manager = telephony_manager(env, &context)?;

            let sim_state = env
                .call_method(&manager, "getSimState", "()I", &[])
                .map_err(|e| jni_err("getSimState", e))?
                .i()
                .map_err(|e| jni_err("getSimState->i", e))?;

            let network_type = env
                .call_method(&manager, "getNetworkType", "()I", &[])
                .map_err(|e| jni_err("getNetworkType", e))?
                .i()
                .map_err(|e| jni_err("getNetworkType->i", e))?;

            tracing::debug!(sim_state, network_type, "Android: USSD capability probe");
            Ok(sim_state == SIM_STATE_READY && network_type != NETWORK_TYPE_UNKNOWN)
        })
    }
}

// ---------------------------------------------------------------------------
// NativeUssdReply -- no public API
// ---------------------------------------------------------------------------

impl NativeUssdReply for AndroidBridge {
    fn supports_replies(&self) -> bool {
        true
    }

    /// Android has no public API to continue an interactive session; the
    /// reply is acknowledged without being sent anywhere.
    fn submit_response(&self, response: &str) -> Result<SuccessPayload> {
        tracing::warn!(
            len = response.len(),
            "Android: no public API to send USSD replies, acknowledging only"
        );
        Ok(unconfirmed_reply())
    }
}

// ---------------------------------------------------------------------------
// Native methods of UssdCallbackShim
// ---------------------------------------------------------------------------

/// `UssdCallbackShim.nativeOnReceiveUssdResponse(long, String, String)`.
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_hyperpolymath_ussdrelay_UssdCallbackShim_nativeOnReceiveUssdResponse(
    mut env: JNIEnv,
    _class: JClass,
    token: jlong,
    _request: JString,
    response: JString,
) {
    let text: String = match env.get_string(&response) {
        Ok(s) => s.into(),
        Err(e) => {
            tracing::error!(token, error = %e, "Android: unreadable USSD response text");
            clear_pending_exception(&mut env);
            String::new()
        }
    };

    match take_callback(token) {
        Some(callback) => callback.on_response(text),
        None => tracing::warn!(
            token = %SessionToken(token as u64),
            "Android: USSD response for an unknown or finished request"
        ),
    }
}

/// `UssdCallbackShim.nativeOnReceiveUssdResponseFailed(long, String, int)`.
#[unsafe(no_mangle)]
pub extern "system" fn Java_org_hyperpolymath_ussdrelay_UssdCallbackShim_nativeOnReceiveUssdResponseFailed(
    _env: JNIEnv,
    _class: JClass,
    token: jlong,
    _request: JString,
    failure_code: jint,
) {
    tracing::error!(token, failure_code, "Android: USSD request failed");
    match take_callback(token) {
        Some(callback) => callback.on_failure(failure_code),
        None => tracing::warn!(
            token = %SessionToken(token as u64),
            "Android: USSD failure for an unknown or finished request"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify that the bridge reports the correct platform name.
    #[test]
    fn platform_name() {
        let bridge = AndroidBridge::new(26);
        assert_eq!(bridge.platform_name(), "Android");
        assert!(bridge.supports_replies());
    }

    #[test]
    fn release_forgets_pending_callback() {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let token = SessionToken(u64::MAX - 1);
        register_callback(CallbackHandle::new(token, sender));

        AndroidBridge::new(26).release(token);
        assert!(take_callback(token.0 as jlong).is_none());
    }

    // SDK and TelephonyManager calls need a running ART VM and have no
    // automated tests.
}
