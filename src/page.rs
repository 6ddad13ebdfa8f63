/// Static signing page served at `/`.
///
/// Checks for an injected wallet provider on load, then connects and requests
/// a `personal_sign` of the fixed authorization message in a single click,
/// posting the resulting signature back to `/submit-signature`.

/// Message the wallet is asked to sign. The remote API verifies the
/// signature against this exact string, so it must not change casually.
pub const SIGNING_MESSAGE: &str = "I want to proceed";

pub const SIGN_PAGE: &str = r##"<!DOCTYPE html>
<html>
<head>
    <title>Wallet Signature</title>
    <style>
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background: #f4f6f8;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            color: #333;
        }
        .container {
            background: #fff;
            border-radius: 8px;
            padding: 30px;
            box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1);
            width: 100%;
            max-width: 480px;
            text-align: center;
        }
        button {
            background-color: #0579ce;
            border: none;
            color: #fff;
            padding: 12px 20px;
            font-size: 16px;
            border-radius: 4px;
            cursor: pointer;
            margin: 10px;
        }
        button:hover { background-color: #0056b3; }
        #status {
            margin-top: 20px;
            padding: 15px;
            border-radius: 5px;
            font-size: 14px;
        }
        .success { background-color: #d4edda; color: #155724; }
        .error { background-color: #f8d7da; color: #721c24; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Wallet signing process</h1>
        <p>To continue you must connect your wallet and sign your authorization.</p>
        <button id="connectAndSignButton">Connect &amp; Sign</button>
        <div id="status"></div>
    </div>
    <script>
        const message = "I want to proceed";
        const statusDiv = document.getElementById('status');

        window.addEventListener('load', function() {
            if (!window.ethereum) {
                statusDiv.textContent = "No wallet extension detected. Please install one to continue.";
                statusDiv.className = "error";
            }
        });

        document.getElementById('connectAndSignButton').addEventListener('click', async () => {
            if (!window.ethereum) return;
            try {
                statusDiv.textContent = "Connecting to wallet...";
                const accounts = await ethereum.request({ method: 'eth_requestAccounts' });
                statusDiv.textContent = `Connected with account: ${accounts[0]}. Requesting signature...`;

                const signature = await ethereum.request({
                    method: 'personal_sign',
                    params: [message, accounts[0]],
                });

                statusDiv.textContent = "Sending signature to server...";
                const response = await fetch('/submit-signature', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ signature })
                });
                await response.text();

                statusDiv.textContent = "Signature received! This window will close automatically.";
                statusDiv.className = "success";
                setTimeout(() => { window.close(); }, 2000);
            } catch (error) {
                statusDiv.textContent = `Error: ${error.message}`;
                statusDiv.className = "error";
            }
        });
    </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_posts_to_submit_endpoint() {
        assert!(SIGN_PAGE.contains("/submit-signature"));
        assert!(SIGN_PAGE.contains("personal_sign"));
    }

    #[test]
    fn test_page_signs_the_fixed_message() {
        assert!(SIGN_PAGE.contains(&format!("\"{SIGNING_MESSAGE}\"")));
    }

    #[test]
    fn test_page_checks_for_wallet_provider() {
        assert!(SIGN_PAGE.contains("window.ethereum"));
    }
}
