/// supported languages for user-facing replies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Lang {
    #[default]
    En,
    Ru,
}

impl Lang {
    /// creates Lang from Telegram's language_code (e.g., "ru", "en", "uk")
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(code) if code.starts_with("ru") => Lang::Ru,
            _ => Lang::En,
        }
    }
}

// =============================================================================
// Error messages
// =============================================================================

impl Lang {
    pub fn error_invalid_link(&self) -> &'static str {
        match self {
            Lang::En => "❌ This link is invalid or has expired.",
            Lang::Ru => "❌ Ссылка недействительна или устарела.",
        }
    }

    pub fn error_batch_too_large(&self, max: u64) -> String {
        match self {
            Lang::En => format!(
                "❌ This link covers too many files. At most {} can be delivered at once.",
                max
            ),
            Lang::Ru => format!(
                "❌ Ссылка охватывает слишком много файлов. За раз можно получить не больше {}.",
                max
            ),
        }
    }

    pub fn error_processing_request(&self) -> &'static str {
        match self {
            Lang::En => "❌ Error processing your request. Please try again later.",
            Lang::Ru => "❌ Ошибка обработки запроса. Попробуйте позже.",
        }
    }

    pub fn error_nothing_delivered(&self) -> &'static str {
        match self {
            Lang::En => "❌ The requested files are no longer available.",
            Lang::Ru => "❌ Запрошенные файлы больше недоступны.",
        }
    }

    pub fn error_verification_failed(&self) -> &'static str {
        match self {
            Lang::En => "❌ This verification link is invalid, expired or already used.\n\nOpen a file link again to get a new one.",
            Lang::Ru => "❌ Ссылка подтверждения недействительна, устарела или уже использована.\n\nОткройте ссылку на файл ещё раз, чтобы получить новую.",
        }
    }
}

// =============================================================================
// Access token gate
// =============================================================================

impl Lang {
    pub fn access_required(&self, validity_hours: i32) -> String {
        match self {
            Lang::En => format!(
                "🔐 <b>Access token required</b>\n\n\
                Verify once through the link below to unlock all files for <b>{} hours</b>.\n\n\
                After verifying, open your file link again.",
                validity_hours
            ),
            Lang::Ru => format!(
                "🔐 <b>Требуется токен доступа</b>\n\n\
                Пройдите проверку по ссылке ниже, чтобы открыть все файлы на <b>{} ч.</b>\n\n\
                После проверки откройте ссылку на файл ещё раз.",
                validity_hours
            ),
        }
    }

    pub fn button_verify(&self) -> &'static str {
        match self {
            Lang::En => "✅ Verify",
            Lang::Ru => "✅ Подтвердить",
        }
    }

    pub fn button_tutorial(&self) -> &'static str {
        match self {
            Lang::En => "📖 How to verify",
            Lang::Ru => "📖 Как пройти проверку",
        }
    }

    pub fn access_granted(&self, expiry: &str, validity_hours: i32) -> String {
        match self {
            Lang::En => format!(
                "✅ <b>Verified!</b>\n\nYou have access for {} hours (until {} UTC).",
                validity_hours, expiry
            ),
            Lang::Ru => format!(
                "✅ <b>Проверка пройдена!</b>\n\nДоступ открыт на {} ч. (до {} UTC).",
                validity_hours, expiry
            ),
        }
    }
}

// =============================================================================
// Delivery
// =============================================================================

impl Lang {
    pub fn please_wait(&self) -> &'static str {
        match self {
            Lang::En => "Please Wait...!",
            Lang::Ru => "Подождите...!",
        }
    }

    pub fn auto_delete_notice(&self, minutes: u64) -> String {
        match self {
            Lang::En => format!(
                "⚠️ These files will be deleted in <b>{} min</b>. Forward them somewhere safe.",
                minutes
            ),
            Lang::Ru => format!(
                "⚠️ Эти файлы будут удалены через <b>{} мин</b>. Перешлите их в надёжное место.",
                minutes
            ),
        }
    }

    pub fn auto_deleted(&self) -> &'static str {
        match self {
            Lang::En => "🗑 The files were deleted.",
            Lang::Ru => "🗑 Файлы удалены.",
        }
    }
}
